//! Turns uploaded image bytes into a model input.

use image::imageops::FilterType;
use image::RgbImage;

use crate::config::IMAGE_SIZE;
use crate::error::PreprocessError;
use crate::math::ImageBatch;

/// Contrast factor applied around the global mean before resizing.
pub const CONTRAST_FACTOR: f32 = 1.2;

/// Decodes `bytes` and prepares a `1 × 224 × 224 × 3` batch with values in [0, 1].
pub fn preprocess_upload(bytes: &[u8]) -> Result<ImageBatch, PreprocessError> {
    preprocess_image(bytes, IMAGE_SIZE)
}

/// Same as `preprocess_upload` for a `size × size` model input.
///
/// Any decodable format and color mode is accepted and converted to RGB.
/// The image then goes through `enhance_contrast`, is resized bilinearly
/// (aspect ratio not preserved) and scaled to [0, 1].
pub fn preprocess_image(bytes: &[u8], size: u32) -> Result<ImageBatch, PreprocessError> {
    let img = image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))?;
    let mut rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    enhance_contrast(&mut rgb, CONTRAST_FACTOR);
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

    let side = size as usize;
    let mut batch = ImageBatch::new(side, side);
    let pixels: Vec<f32> = resized.into_raw().into_iter().map(|c| c as f32 / 255.0).collect();
    batch.push(&pixels);
    Ok(batch)
}

/// Stretches every channel value away from the mean of all values (all
/// pixels, all channels) by `factor`, clipping to the valid range and
/// truncating back to 8 bits.
pub fn enhance_contrast(img: &mut RgbImage, factor: f32) {
    let raw: &mut [u8] = &mut **img;
    if raw.is_empty() {
        return;
    }
    let mean = raw.iter().map(|&c| c as f64).sum::<f64>() / raw.len() as f64 / 255.0;
    let mean = mean as f32;
    for c in raw.iter_mut() {
        let v = *c as f32 / 255.0;
        let stretched = ((v - mean) * factor + mean).clamp(0.0, 1.0);
        *c = (stretched * 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn assert_model_input(batch: &ImageBatch, size: usize) {
        assert_eq!(batch.shape(), [1, size, size, 3]);
        assert!(batch.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn any_mode_and_size_becomes_a_single_rgb_input() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(640, 480, |x, _| Luma([(x % 256) as u8])));
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(17, 301, Rgba([10, 200, 30, 128])));
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));

        assert_model_input(&preprocess_upload(&encode(gray, ImageOutputFormat::Png)).unwrap(), 224);
        assert_model_input(&preprocess_upload(&encode(rgba, ImageOutputFormat::Png)).unwrap(), 224);
        assert_model_input(&preprocess_upload(&encode(rgb.clone(), ImageOutputFormat::Jpeg(90))).unwrap(), 224);
        assert_model_input(&preprocess_image(&encode(rgb, ImageOutputFormat::Bmp), 32).unwrap(), 32);
    }

    #[test]
    fn bytes_that_are_not_an_image_fail_to_decode() {
        let err = preprocess_upload(b"definitely not a picture").unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
        assert!(err.to_string().starts_with("cannot identify image file"));
    }

    #[test]
    fn contrast_uses_the_mean_over_all_channels() {
        // the six values average to 0.5, so 51 (0.2) stretches to 0.14
        let mut img = RgbImage::from_raw(2, 1, vec![0, 255, 51, 204, 102, 153]).unwrap();
        enhance_contrast(&mut img, 1.2);
        let raw = img.into_raw();
        assert_eq!(raw[0], 0);
        assert_eq!(raw[1], 255);
        assert_eq!(raw[2], 35);
    }

    #[test]
    fn uniform_image_is_unchanged_by_contrast() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([90, 90, 90]));
        enhance_contrast(&mut img, 1.2);
        assert!(img.pixels().all(|p| p.0 == [90, 90, 90] || p.0 == [89, 89, 89]));
    }
}
