//! Page image normalization for transport and storage.

use base64::Engine as _;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage};

use super::PipelineError;

/// Encode a raster page for the model request payload and the page record:
/// force RGB, serialize to PNG at best compression, then base64.
///
/// A codec failure is fatal for the page, never for the document.
pub fn encode_page_image(image: &DynamicImage) -> Result<String, PipelineError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut png = Vec::new();
    PngEncoder::new_with_quality(&mut png, CompressionType::Best, FilterType::Paeth)
        .encode(rgb.as_raw(), width, height, ColorType::Rgb8)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}
