//! Raster images: decode, flatten transparency, encode.
//!
//! JPEG has no alpha channel, so anything headed for JPEG (or for PDF, which
//! embeds a JPEG) is composited onto an opaque white background first. PNG
//! output keeps the source's channels, alpha included.

use crate::config::JPEG_QUALITY;
use crate::error::ConvertError;
use crate::format::Format;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Decode the image at `path`. The container is sniffed from the content,
/// so a mislabelled extension still decodes.
pub fn decode(path: &Path, format: Format) -> Result<DynamicImage, ConvertError> {
    let img = ImageReader::open(path)
        .map_err(|e| ConvertError::decode(format, e))?
        .with_guessed_format()
        .map_err(|e| ConvertError::decode(format, e))?
        .decode()
        .map_err(|e| ConvertError::decode(format, e))?;
    debug!(
        "Decoded {} {}x{} ({:?})",
        format,
        img.width(),
        img.height(),
        img.color()
    );
    Ok(img)
}

/// Composite `img` onto opaque white and drop the alpha channel.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        dst.0 = [blend(r, a), blend(g, a), blend(b, a)];
    }
    out
}

fn blend(channel: u8, alpha: u8) -> u8 {
    let (c, a) = (u32::from(channel), u32::from(alpha));
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Encode an RGB image as JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(img: &RgbImage, target: Format) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .map_err(|e| ConvertError::encode(target, e))?;
    Ok(buf)
}

/// Encode `img` as PNG, keeping its channels.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ConvertError::encode(Format::Png, e))?;
    Ok(buf)
}

/// Encode `img` for a raster `target` (png, jpg or jpeg).
pub fn encode_for(img: &DynamicImage, target: Format) -> Result<Vec<u8>, ConvertError> {
    match target {
        Format::Png => encode_png(img),
        Format::Jpg | Format::Jpeg => encode_jpeg(&flatten_onto_white(img), target),
        other => Err(ConvertError::encode(
            other,
            format!("{other} is not a raster target"),
        )),
    }
}
