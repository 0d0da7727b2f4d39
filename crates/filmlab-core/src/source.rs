//! Source images handed to the renderer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// An immutable, cheaply clonable 8-bit sRGB source image.
///
/// Each construction gets a process-unique id. The GPU layer keys its
/// uploaded source texture and cached intermediates on this id, so two
/// clones of the same `SourceImage` share uploads while a new image
/// always re-uploads.
#[derive(Debug, Clone)]
pub struct SourceImage {
    id: u64,
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            pixels: Arc::new(pixels),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl From<RgbaImage> for SourceImage {
    fn from(pixels: RgbaImage) -> Self {
        Self::new(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_id_new_images_do_not() {
        let a = SourceImage::new(RgbaImage::new(4, 2));
        let b = a.clone();
        let c = SourceImage::new(RgbaImage::new(4, 2));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!((a.width(), a.height()), (4, 2));
    }
}
