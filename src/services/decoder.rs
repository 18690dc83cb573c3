use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

pub type Bitmap = image::DynamicImage;

#[async_trait]
pub trait ImageDecoder: Send + Sync {
    /// `None` on any failure, including an image with no pixels.
    async fn decode_image_file(&self, path: &Path) -> Option<Bitmap>;
}

/// Decodes with the `image` crate on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

#[async_trait]
impl ImageDecoder for ImageCrateDecoder {
    async fn decode_image_file(&self, path: &Path) -> Option<Bitmap> {
        let owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || image::open(&owned)).await;

        match decoded {
            Ok(Ok(bitmap)) if bitmap.width() > 0 && bitmap.height() > 0 => Some(bitmap),
            Ok(Ok(_)) => {
                debug!(path = %path.display(), "decoded image is empty");
                None
            }
            Ok(Err(err)) => {
                debug!(path = %path.display(), %err, "decode failed");
                None
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "decode task failed");
                None
            }
        }
    }
}
