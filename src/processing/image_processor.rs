use std::io::Cursor;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma};
use log::debug;
use crate::utils::{ErrorCode, OcrError};

/// Grayscale crop of the MRZ band, PNG-encoded for the recognition engine.
/// The buffer is owned and dropped with the value, so the temporary bitmap
/// is released on every exit path.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// ImageProcessor prepares a passport photo for OCR: decode, crop to the
/// MRZ band, normalize to grayscale.
pub struct ImageProcessor;

/// Fraction of the frame height occupied by the ICAO 9303 MRZ band at the
/// bottom of a TD3 data page.
const MRZ_BAND_FRACTION: u32 = 4;

impl ImageProcessor {
    /// Decode the image, crop to the bottom 25% of the frame, and convert
    /// the crop to grayscale using luminance weighting.
    ///
    /// Non-image input fails with `InvalidInput`; a decode failure on a
    /// recognized format is fatal to this stage and surfaces as
    /// `ProcessingFailed`. No retries.
    pub fn preprocess(image_bytes: &[u8]) -> Result<PreprocessedImage, OcrError> {
        if image_bytes.is_empty() {
            return Err(OcrError::with_technical(
                ErrorCode::InvalidInput,
                "empty input buffer",
            ));
        }

        // Distinguish "not an image at all" from "image that failed to decode".
        image::guess_format(image_bytes).map_err(|e| {
            OcrError::with_technical(ErrorCode::InvalidInput, format!("unrecognized format: {}", e))
        })?;

        let image = image::load_from_memory(image_bytes).map_err(|e| {
            OcrError::with_technical(ErrorCode::ProcessingFailed, format!("decode failed: {}", e))
        })?;

        let (width, height) = image.dimensions();
        if width == 0 || height < MRZ_BAND_FRACTION {
            return Err(OcrError::with_technical(
                ErrorCode::ProcessingFailed,
                format!("image too small: {}x{}", width, height),
            ));
        }

        // The MRZ sits in the bottom quarter of the data page.
        let band_height = height / MRZ_BAND_FRACTION;
        let band_top = height - band_height;
        let cropped = image.crop_imm(0, band_top, width, band_height);

        let grayscale = Self::to_luminance_gray(&cropped);
        debug!(
            "preprocessed image: {}x{} -> MRZ band {}x{}",
            width, height, width, band_height
        );

        let mut buffer = Vec::with_capacity((width * band_height) as usize / 2);
        let mut cursor = Cursor::new(&mut buffer);
        DynamicImage::ImageLuma8(grayscale)
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| {
                OcrError::with_technical(
                    ErrorCode::ProcessingFailed,
                    format!("failed to encode MRZ band: {}", e),
                )
            })?;

        Ok(PreprocessedImage {
            png: buffer,
            width,
            height: band_height,
        })
    }

    /// Per-pixel grayscale conversion with the ITU-R 601 luminance weights
    /// (0.299R + 0.587G + 0.114B). Normalizes contrast for OCR and strips
    /// color artifacts that read as false glyphs.
    fn to_luminance_gray(image: &DynamicImage) -> GrayImage {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut gray = GrayImage::new(width, height);

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            gray.put_pixel(x, y, Luma([luma.round().min(255.0) as u8]));
        }

        gray
    }
}
