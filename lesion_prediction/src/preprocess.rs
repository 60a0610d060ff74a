use crate::decoder::DecodedImage;
use image::{imageops::FilterType, ImageBuffer, Rgb};
use ndarray::{Array, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("cannot preprocess an image of {width}x{height} pixels")]
    EmptyImage { width: usize, height: usize },
    #[error("pixel buffer does not match its {width}x{height} dimensions")]
    Buffer { width: usize, height: usize },
}

/// Batched NHWC tensor with values in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct InputTensor(Array<f32, Ix4>);

impl InputTensor {
    pub fn new(array: Array<f32, Ix4>) -> Self {
        Self(array)
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn as_array(&self) -> &Array<f32, Ix4> {
        &self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    size: u32,
}

impl Preprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Stretches the image to `size x size` and rescales every channel by 1/255.
    pub fn transform(&self, image: &DecodedImage) -> Result<InputTensor, PreprocessError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(PreprocessError::EmptyImage { width, height });
        }

        // Channels are resized independently, so the buffer is channel-order agnostic.
        let raw: Vec<u8> = image.view().iter().copied().collect();
        let buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width as u32, height as u32, raw)
            .ok_or(PreprocessError::Buffer { width, height })?;
        let resized = image::imageops::resize(&buffer, self.size, self.size, FilterType::Triangle);

        let side = self.size as usize;
        let mut input = Array::zeros((1, side, side, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for (c, value) in pixel.0.iter().enumerate() {
                input[[0, y, x, c]] = (*value as f32) / 255.;
            }
        }

        Ok(InputTensor::new(input))
    }
}
