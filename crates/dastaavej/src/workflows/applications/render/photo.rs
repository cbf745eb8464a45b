//! Photo preparation for the form. Whatever the citizen uploaded (RGBA or palette PNG,
//! 16-bit PNG, CMYK JPEG) is decoded, flattened onto white, and re-encoded as a baseline
//! RGB JPEG that every PDF reader can show through `DCTDecode`.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

/// Longest edge kept in the PDF; larger photos are scaled down.
const MAX_EDGE: u32 = 600;
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    /// Baseline JPEG, three components.
    pub data: Vec<u8>,
}

/// `None` means the photo cannot be embedded and the form says so instead.
pub(super) fn decode(bytes: &[u8]) -> Option<EmbeddedImage> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(error = %err, "photo is not a decodable image");
            return None;
        }
    };

    let decoded = if decoded.width() > MAX_EDGE || decoded.height() > MAX_EDGE {
        decoded.thumbnail(MAX_EDGE, MAX_EDGE)
    } else {
        decoded
    };
    let rgb = flatten_on_white(&decoded);

    let mut data = Vec::new();
    if let Err(err) = JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY).encode_image(&rgb) {
        debug!(error = %err, "photo could not be re-encoded");
        return None;
    }

    Some(EmbeddedImage {
        width: rgb.width(),
        height: rgb.height(),
        data,
    })
}

fn flatten_on_white(decoded: &DynamicImage) -> RgbImage {
    let rgba = decoded.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [red, green, blue, alpha] = pixel.0;
        let alpha = u16::from(alpha);
        let blend = |channel: u8| {
            let mixed = (u16::from(channel) * alpha + 255 * (255 - alpha)) / 255;
            mixed as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(red), blend(green), blend(blue)]));
    }
    flattened
}
