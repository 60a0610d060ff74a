use crate::config::ColorOrder;
use image::{metadata::Orientation, DynamicImage, ImageDecoder as _};
use ndarray::{Array3, ArrayView3};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unsupported or malformed image {path}: {source}")]
    Image {
        path: String,
        source: image::ImageError,
    },
    #[error("image {path} has no pixels")]
    Empty { path: String },
}

/// An `height x width x 3` pixel array in the channel order the classifier was trained on.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: Array3<u8>,
}

impl DecodedImage {
    pub fn new(pixels: Array3<u8>) -> Self {
        Self { pixels }
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    color_order: ColorOrder,
}

impl ImageDecoder {
    pub fn new(color_order: ColorOrder) -> Self {
        Self { color_order }
    }

    /// Reads a stored upload and decodes it, guessing the format from its content.
    pub fn decode_path(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let display = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| DecodeError::Read {
            path: display.clone(),
            source,
        })?;
        self.decode_bytes(&bytes, &display)
    }

    pub fn decode_bytes(&self, bytes: &[u8], name: &str) -> Result<DecodedImage, DecodeError> {
        let image_reader = image::ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|source| DecodeError::Read {
                path: name.to_string(),
                source,
            })?;

        let image_error = |source: image::ImageError| DecodeError::Image {
            path: name.to_string(),
            source,
        };
        let mut decoder = image_reader.into_decoder().map_err(image_error)?;
        // Phone cameras store rotation as EXIF metadata instead of rotating the pixels.
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image = DynamicImage::from_decoder(decoder).map_err(image_error)?;
        image.apply_orientation(orientation);
        let rgb = image.to_rgb8();

        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Empty {
                path: name.to_string(),
            });
        }

        let mut pixels = Array3::<u8>::zeros((height as usize, width as usize, 3));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let channels = match self.color_order {
                ColorOrder::Bgr => [b, g, r],
                ColorOrder::Rgb => [r, g, b],
            };
            for (c, value) in channels.into_iter().enumerate() {
                pixels[[y as usize, x as usize, c]] = value;
            }
        }

        Ok(DecodedImage::new(pixels))
    }
}
