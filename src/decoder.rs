//! Payload decoding: zlib detection, inflation and UTF-8 decoding.
//!
//! Cursor stores most values as plain JSON text, but some rows hold zlib streams
//! written at the default compression level. Those are recognised purely by their
//! two-byte header; anything that fails to inflate is treated as raw bytes again.

use flate2::{Decompress, FlushDecompress, Status};
use std::fmt::Write;
use tracing::debug;

use crate::error::DecodeError;
use crate::importer::Payload;

/// zlib header (CMF/FLG) emitted at the default compression level.
pub const ZLIB_SIGNATURE: [u8; 2] = [0x78, 0x9C];

/// How many bytes the binary fallback view shows before truncating.
pub const HEX_PREVIEW_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub was_compressed: bool,
}

/// Decode a stored value into text.
///
/// Text payloads pass through untouched. Byte payloads are inflated when they carry
/// the zlib signature and the stream is complete, then decoded as strict UTF-8.
pub fn decode(payload: &Payload) -> Result<Decoded, DecodeError> {
    match payload {
        Payload::Text(text) => Ok(Decoded {
            text: text.clone(),
            was_compressed: false,
        }),
        Payload::Bytes(bytes) => decode_bytes(bytes),
    }
}

pub fn decode_bytes(raw: &[u8]) -> Result<Decoded, DecodeError> {
    let (bytes, was_compressed) = match inflate(raw) {
        Some(inflated) => (inflated, true),
        None => (raw.to_vec(), false),
    };

    String::from_utf8(bytes)
        .map(|text| Decoded {
            text,
            was_compressed,
        })
        .map_err(|e| {
            debug!(len = raw.len(), was_compressed, "payload is not valid UTF-8");
            DecodeError::Binary {
                bytes: e.into_bytes(),
                was_compressed,
            }
        })
}

/// Inflate `raw` if it looks like a zlib stream. `None` means "use the bytes as they are",
/// which covers both a missing signature and a corrupt or truncated stream.
fn inflate(raw: &[u8]) -> Option<Vec<u8>> {
    if !raw.starts_with(&ZLIB_SIGNATURE) {
        return None;
    }

    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(raw.len().saturating_mul(4).max(64));
    loop {
        let consumed = inflater.total_in() as usize;
        match inflater.decompress_vec(&raw[consumed..], &mut out, FlushDecompress::Finish) {
            Ok(Status::StreamEnd) => return Some(out),
            Ok(_) if out.len() == out.capacity() => out.reserve(out.capacity()),
            Ok(_) => {
                debug!(len = raw.len(), "zlib stream ended early; treating payload as raw");
                return None;
            }
            Err(e) => {
                debug!(len = raw.len(), error = %e, "zlib inflate failed; treating payload as raw");
                return None;
            }
        }
    }
}

/// Human-readable stand-in for bytes that are not text.
pub fn hex_preview(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(HEX_PREVIEW_LIMIT)];
    let mut out = format!("Binary data (showing first {HEX_PREVIEW_LIMIT} bytes):\n");
    for (i, b) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    if bytes.len() > HEX_PREVIEW_LIMIT {
        let _ = write!(out, "\n... {} more bytes ...", bytes.len() - HEX_PREVIEW_LIMIT);
    }
    out
}
