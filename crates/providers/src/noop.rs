use crate::{ProviderError, VisionProvider, VisionRequest, VisionResponse};

#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl VisionProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn generate(&self, _request: &VisionRequest) -> Result<VisionResponse, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
