use std::path::Path;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::shared::frame::{Frame, FrameError};

/// Decodes an encoded image (PNG, JPEG, BMP, ...) into an RGB [`Frame`].
///
/// Accepts raw file bytes, a bare base64 payload, or a `data:image/...;base64,`
/// URL as posted by browser capture clients.
pub fn decode_frame(bytes: &[u8], captured_at: DateTime<Utc>) -> Result<Frame, FrameError> {
    if bytes.is_empty() {
        return Err(FrameError::InvalidFrame("empty image buffer".into()));
    }
    let raw = match base64_payload(bytes) {
        Some(payload) => BASE64_STANDARD
            .decode(payload)
            .map_err(|e| FrameError::InvalidFrame(format!("bad base64 payload: {e}")))?,
        None => bytes.to_vec(),
    };
    let img = image::load_from_memory(&raw)
        .map_err(|e| FrameError::InvalidFrame(format!("undecodable image: {e}")))?;
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    Frame::new(rgb.into_raw(), w, h, 3, captured_at)
}

/// Reads and decodes an image file.
pub fn load_frame(path: &Path, captured_at: DateTime<Utc>) -> Result<Frame, FrameError> {
    let bytes = std::fs::read(path)
        .map_err(|e| FrameError::InvalidFrame(format!("{}: {e}", path.display())))?;
    decode_frame(&bytes, captured_at)
}

/// Returns the base64 text when `bytes` look like a data URL or bare base64.
///
/// Binary image formats all start with a non-base64 magic byte, so anything
/// made only of base64 alphabet characters is treated as encoded text.
fn base64_payload(bytes: &[u8]) -> Option<&[u8]> {
    if let Some(rest) = bytes.strip_prefix(b"data:") {
        let comma = rest.iter().position(|&b| b == b',')?;
        return Some(trim_ascii(&rest[comma + 1..]));
    }
    let trimmed = trim_ascii(bytes);
    let is_base64 = !trimmed.is_empty()
        && trimmed
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    is_base64.then_some(trimmed)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
