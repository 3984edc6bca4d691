use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, GenericImageView};
use tokio::task::spawn_blocking;

/// How downloaded post images are shrunk before OCR.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Rows removed from the top (app chrome in screenshots).
    pub crop_top: u32,
    pub max_edge: u32,
    pub jpeg_quality: u8,
}

/// Crop, downscale, grayscale and re-encode one image as JPEG.
pub fn normalize(bytes: &[u8], options: &NormalizeOptions) -> Result<Vec<u8>> {
    let mut img = image::load_from_memory(bytes).context("undecodable image")?;

    let (width, height) = img.dimensions();
    if height > options.crop_top {
        img = img.crop_imm(0, options.crop_top, width, height - options.crop_top);
    }

    let (width, height) = img.dimensions();
    if width.max(height) > options.max_edge {
        img = img.resize(options.max_edge, options.max_edge, FilterType::Triangle);
    }

    let gray = img.to_luma8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, options.jpeg_quality.clamp(1, 100))
        .encode_image(&gray)
        .context("jpeg encoding failed")?;
    Ok(out.into_inner())
}

/// [`normalize`] on the blocking pool.
pub async fn normalize_blocking(bytes: Vec<u8>, options: NormalizeOptions) -> Result<Vec<u8>> {
    spawn_blocking(move || normalize(&bytes, &options))
        .await
        .context("image normalization task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    const OPTIONS: NormalizeOptions = NormalizeOptions {
        crop_top: 150,
        max_edge: 800,
        jpeg_quality: 50,
    };

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn crops_then_fits_longest_edge() {
        let jpeg = normalize(&png(1200, 900), &OPTIONS).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (800, 500));
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn short_images_are_not_cropped_or_upscaled() {
        let jpeg = normalize(&png(100, 120), &OPTIONS).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (100, 120));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(normalize(b"not an image", &OPTIONS).is_err());
    }

    #[tokio::test]
    async fn runs_on_blocking_pool() {
        let jpeg = normalize_blocking(png(300, 400), OPTIONS).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (300, 250));
    }
}
