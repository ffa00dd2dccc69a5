use amenity_cli::report;
use amenity_core::config::{self, AppConfig};
use amenity_core::data_manager::AmenityDataManager;
use amenity_core::schema::load_schema;
use amenity_core::PropertyAmenitySystem;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Run {
            path,
            recursive,
            json,
        } => run(cfg, path, recursive, json).await,
        Commands::Summary { json } => run_summary(cfg, json).await,
        Commands::Results { json } => run_results(cfg, json).await,
        Commands::Frequencies { json } => run_frequencies(cfg, json).await,
        Commands::Schema { json } => run_schema(cfg, json),
        Commands::Serve { host, port } => run_serve(cfg, host, port).await,
    }
}

#[derive(Parser)]
#[command(name = "amenity")]
#[command(about = "Detect amenities in property photos with a hosted vision-language model", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process an image or a directory of images
    Run {
        /// Image file or directory (defaults to input.path)
        path: Option<PathBuf>,
        /// Descend into subdirectories
        #[arg(long)]
        recursive: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-image amenity counts
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// All stored results
    Results {
        #[arg(long)]
        json: bool,
    },
    /// How many images each amenity appears in
    Frequencies {
        #[arg(long)]
        json: bool,
    },
    /// Print the active amenity schema
    Schema {
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP API and web UI
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_data(cfg: &AppConfig) -> Result<AmenityDataManager> {
    let schema = Arc::new(load_schema(&cfg.amenity_schema));
    AmenityDataManager::open(cfg.output.dir(), schema).await
}

async fn run(mut cfg: AppConfig, path: Option<PathBuf>, recursive: bool, json: bool) -> Result<()> {
    let target = path.unwrap_or_else(|| PathBuf::from(&cfg.input.path));
    if recursive {
        cfg.input.recursive = true;
    }
    info!(path = %target.display(), provider = %cfg.model.provider, "starting run");
    let system = PropertyAmenitySystem::new(cfg).await?;

    if target.is_file() {
        let (detection, record) = system.process_image(&target).await?;
        if json {
            let out = serde_json::json!({
                "image_path": record.image_path,
                "room_category": record.room_category,
                "amenities": detection.amenities_by_room,
                "description": detection.description,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            print!("{}", report::detection_text(&detection));
        }
        return Ok(());
    }

    let summary = system.process_directory(&target).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::run_text(&summary));
    }
    Ok(())
}

async fn run_summary(cfg: AppConfig, json: bool) -> Result<()> {
    let rows = open_data(&cfg).await?.results_summary().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", report::summary_table(&rows));
    }
    Ok(())
}

async fn run_results(cfg: AppConfig, json: bool) -> Result<()> {
    let rows = open_data(&cfg).await?.all_results().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", report::results_text(&rows));
    }
    Ok(())
}

async fn run_frequencies(cfg: AppConfig, json: bool) -> Result<()> {
    let rows = open_data(&cfg).await?.amenity_frequencies().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print!("{}", report::frequency_table(&rows));
    }
    Ok(())
}

fn run_schema(cfg: AppConfig, json: bool) -> Result<()> {
    let schema = load_schema(&cfg.amenity_schema);
    if json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
    } else {
        print!("{}", report::schema_text(&schema));
    }
    Ok(())
}

async fn run_serve(mut cfg: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        cfg.server.host = host;
    }
    if let Some(port) = port {
        cfg.server.port = port;
    }
    let host = cfg.server.host.clone();
    let port = cfg.server.port;
    let system = Arc::new(PropertyAmenitySystem::new(cfg).await?);
    amenity_server::serve(system, &host, port).await
}
