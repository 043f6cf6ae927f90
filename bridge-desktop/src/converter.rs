//! Preview conversion with the `image` crate.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    image::ImageConverter,
};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decodes any format `image` understands and re-encodes by target
/// extension. JPEG output drops the alpha channel.
#[derive(Debug, Clone, Default)]
pub struct ImageCrateConverter;

impl ImageCrateConverter {
    pub fn new() -> Self {
        Self
    }

    fn convert_blocking(source: &Path, target: &Path) -> Result<()> {
        let format = ImageFormat::from_path(target).map_err(|e| {
            BridgeError::InvalidInput(format!("Unsupported target {}: {}", target.display(), e))
        })?;
        let img = image::open(source).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to load {}: {}", source.display(), e))
        })?;

        let img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
            _ => img,
        };
        img.save_with_format(target, format).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to write {}: {}", target.display(), e))
        })
    }
}

#[async_trait]
impl ImageConverter for ImageCrateConverter {
    async fn convert(&self, source: &Path, target: &Path) -> Result<()> {
        let source: PathBuf = source.to_path_buf();
        let target: PathBuf = target.to_path_buf();
        let (from, to) = (source.clone(), target.clone());

        tokio::task::spawn_blocking(move || Self::convert_blocking(&from, &to))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Conversion task failed: {}", e)))??;

        debug!(source = ?source, target = ?target, "Converted image");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_png_to_jpg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("preview.png");
        let target = dir.path().join("preview.jpg");

        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 10, 10, 128]));
        img.save(&source).unwrap();

        ImageCrateConverter::new()
            .convert(&source, &target)
            .await
            .unwrap();

        let written = image::open(&target).unwrap();
        assert_eq!(written.width(), 8);
        assert_eq!(ImageFormat::from_path(&target).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_unknown_target_extension() {
        let dir = tempfile::tempdir().unwrap();
        let result = ImageCrateConverter::new()
            .convert(&dir.path().join("a.png"), &dir.path().join("a.unknown"))
            .await;
        assert!(matches!(result, Err(BridgeError::InvalidInput(_))));
    }
}
