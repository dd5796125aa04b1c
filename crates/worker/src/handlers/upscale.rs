//! UPSCALE: enlarge a staged image by an integer factor.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde_json::{json, Value};
use taskhub_core::artifact::ArtifactRef;

use super::JobContext;
use crate::error::HandlerError;

/// Largest width or height an upscaled image may have.
pub const MAX_OUTPUT_DIMENSION: u32 = 16_384;

pub(super) async fn run(
    ctx: &JobContext,
    input: &ArtifactRef,
    output: &ArtifactRef,
) -> Result<Value, HandlerError> {
    let bytes = ctx.stager.load(input).await?;
    let factor = ctx.config.upscale_factor;
    let extension = output.extension().to_string();

    // Decoding and resampling are CPU bound.
    let encoded =
        tokio::task::spawn_blocking(move || upscale_image(&bytes, factor, &extension)).await??;

    ctx.stager.write(output, &encoded).await?;
    tracing::debug!(
        input = %input,
        output = %output,
        bytes = encoded.len(),
        "Upscaled artifact written"
    );

    Ok(json!(output.file_name()))
}

/// Decode `bytes`, resize by `factor` with Lanczos resampling, and encode
/// the result in the format named by `extension`.
///
/// The input format is detected from the content, not the extension.
pub fn upscale_image(bytes: &[u8], factor: u32, extension: &str) -> Result<Vec<u8>, HandlerError> {
    let format = ImageFormat::from_extension(extension)
        .ok_or_else(|| HandlerError::UnsupportedFormat(extension.to_string()))?;

    let source = image::load_from_memory(bytes)?;
    let width = u64::from(source.width()) * u64::from(factor);
    let height = u64::from(source.height()) * u64::from(factor);
    let max = u64::from(MAX_OUTPUT_DIMENSION);
    if width > max || height > max {
        return Err(HandlerError::TooLarge {
            width,
            height,
            max: MAX_OUTPUT_DIMENSION,
        });
    }

    // Both fit in u32 after the bound check above.
    let resized = source.resize_exact(width as u32, height as u32, FilterType::Lanczos3);
    let resized = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        ImageFormat::WebP => DynamicImage::ImageRgba8(resized.to_rgba8()),
        _ => resized,
    };

    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, format)?;
    Ok(out.into_inner())
}
