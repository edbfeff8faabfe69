//! Conversion backends
//!
//! Defines the backend trait implemented by the local browser and the remote
//! API variants.

use async_trait::async_trait;

use super::options::RenderOptions;
use super::types::ConversionError;

/// Conversion backend trait
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Short backend name for logs and the status endpoint
    fn name(&self) -> &'static str;

    /// Render `html` into PDF bytes
    async fn convert(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>, ConversionError>;
}
