use crate::config::ModelConfig;
use image::imageops::FilterType;
use ndarray::{Array, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error decoding image: {0}")]
    Decode(String),
    #[error("Image has zero width or height")]
    EmptyImage,
}

#[derive(Debug, Clone)]
pub struct ImageTransform {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageTransform {
    pub fn new(size: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { size, mean, std }
    }

    /// Decodes raw image bytes into a normalized `1x3xSxS` tensor.
    pub fn transform(&self, image_data: &[u8]) -> Result<Array<f32, Ix4>, PreprocessError> {
        let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
            .with_guessed_format()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        let original_img = image_reader
            .decode()
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        if original_img.width() == 0 || original_img.height() == 0 {
            return Err(PreprocessError::EmptyImage);
        }

        let size = self.size;
        let img = original_img
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        let scale = |value: u8, channel: usize| {
            ((value as f32) / 255. - self.mean[channel]) / self.std[channel]
        };

        let mut input = Array::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in img.enumerate_pixels() {
            let x = x as usize;
            let y = y as usize;
            let [r, g, b] = pixel.0;
            input[[0, 0, y, x]] = scale(r, 0);
            input[[0, 1, y, x]] = scale(g, 1);
            input[[0, 2, y, x]] = scale(b, 2);
        }

        Ok(input)
    }
}

impl From<&ModelConfig> for ImageTransform {
    fn from(config: &ModelConfig) -> Self {
        Self::new(config.input_size, config.mean, config.std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_transform_shape() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 60, Rgb([255, 0, 0]));
        let transform = ImageTransform::new(224, MEAN, STD);

        let input = transform.transform(&encode_png(img.into())).unwrap();

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_transform_normalizes_channels() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(32, 32, Rgb([255, 0, 0]));
        let transform = ImageTransform::new(16, MEAN, STD);

        let input = transform.transform(&encode_png(img.into())).unwrap();

        let expected_r = (1.0 - MEAN[0]) / STD[0];
        let expected_g = (0.0 - MEAN[1]) / STD[1];
        let expected_b = (0.0 - MEAN[2]) / STD[2];
        assert!((input[[0, 0, 5, 7]] - expected_r).abs() < 1e-5);
        assert!((input[[0, 1, 5, 7]] - expected_g).abs() < 1e-5);
        assert!((input[[0, 2, 5, 7]] - expected_b).abs() < 1e-5);
    }

    #[test]
    fn test_transform_drops_alpha_channel() {
        let img = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(8, 8, Rgba([0, 255, 0, 10]));
        let transform = ImageTransform::new(8, MEAN, STD);

        let input = transform.transform(&encode_png(img.into())).unwrap();

        assert_eq!(input.shape(), &[1, 3, 8, 8]);
        assert!((input[[0, 1, 0, 0]] - (1.0 - MEAN[1]) / STD[1]).abs() < 1e-5);
    }

    #[test]
    fn test_transform_rejects_garbage() {
        let transform = ImageTransform::new(224, MEAN, STD);
        let result = transform.transform(b"definitely not an image");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
