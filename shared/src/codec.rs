use thiserror::Error;

use crate::Patch;

/// Leading byte of every encoded patch. Bumped whenever the record layout
/// changes, so a mirror can refuse a patch it cannot read and ask for a
/// resync instead.
pub const PATCH_FORMAT_VERSION: u8 = 1;

/// Errors that can occur while encoding or decoding patches
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Failed to encode patch: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode patch: {reason}")]
    Decode { reason: String },

    #[error("Empty patch buffer")]
    Empty,

    #[error("Unsupported patch format {found}, expected {expected}")]
    UnsupportedFormat { found: u8, expected: u8 },
}

pub fn encode_patch(patch: &Patch) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serde::encode_to_vec(patch, bincode::config::standard()).map_err(|e| {
        CodecError::Encode {
            reason: e.to_string(),
        }
    })?;
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(PATCH_FORMAT_VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode_patch(bytes: &[u8]) -> Result<Patch, CodecError> {
    let Some((format, body)) = bytes.split_first() else {
        return Err(CodecError::Empty);
    };
    if *format != PATCH_FORMAT_VERSION {
        return Err(CodecError::UnsupportedFormat {
            found: *format,
            expected: PATCH_FORMAT_VERSION,
        });
    }
    let (patch, read) = bincode::serde::decode_from_slice(body, bincode::config::standard())
        .map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })?;
    if read != body.len() {
        return Err(CodecError::Decode {
            reason: format!("{} trailing bytes", body.len() - read),
        });
    }
    Ok(patch)
}
