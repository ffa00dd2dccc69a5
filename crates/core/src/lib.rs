//! Core library: amenity schema, detection, result storage and orchestration.

pub mod config;
pub mod csv_store;
pub mod data_manager;
pub mod detector;
pub mod error;
pub mod imaging;
pub mod models;
pub mod parser;
pub mod scanner;
pub mod schema;
pub mod system;

pub use error::DetectError;
pub use system::{PropertyAmenitySystem, RunReport};
