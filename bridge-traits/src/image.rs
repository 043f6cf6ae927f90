//! Image conversion for cached previews.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Converts image files between formats.
///
/// The output format is chosen from the extension of `target`.
#[async_trait]
pub trait ImageConverter: Send + Sync {
    async fn convert(&self, source: &Path, target: &Path) -> Result<()>;
}
