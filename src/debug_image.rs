//! Debug dump of blend buffers for visual inspection

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

use crate::blend::BlendBuffer;

/// Write the blend buffer as a binary PPM (P6, maxval 255).
///
/// Every channel of a blend pixel carries the same intensity, so dropping
/// alpha loses nothing.
pub fn dump_blend_ppm(buffer: &BlendBuffer, path: &Path) -> Result<()> {
    let img = RgbImage::from_fn(buffer.width(), buffer.height(), |x, y| {
        let [r, g, b, _] = buffer.pixel(x, y).unwrap_or([0; 4]);
        Rgb([r, g, b])
    });

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create debug image directory {:?}", parent))?;
    }

    img.save_with_format(path, ImageFormat::Pnm)
        .with_context(|| format!("Failed to write debug image {:?}", path))?;

    tracing::debug!("Wrote blend debug image {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::{BlendBufferBuilder, BlendGrid};

    #[test]
    fn test_dump_ppm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug").join("ppm_after-3.ppm");

        let grid = BlendGrid::from_values(3, 2, vec![10, 20, 30, 40, 50, 60]).unwrap();
        let buffer = BlendBufferBuilder::new(3, 2, 0).build(&grid);
        dump_blend_ppm(&buffer, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P6"));
        // Pixel data is the trailing width * height * 3 bytes, top row first
        let pixels = &bytes[bytes.len() - 3 * 2 * 3..];
        assert_eq!(&pixels[..3], &[40, 40, 40]);
        assert_eq!(&pixels[pixels.len() - 3..], &[30, 30, 30]);
    }
}
