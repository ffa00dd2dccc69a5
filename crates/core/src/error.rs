use providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("unreadable image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("model call failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
