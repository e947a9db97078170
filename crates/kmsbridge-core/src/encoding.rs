//! Text-safe payload encoding for the backend JSON fields.
//!
//! Plaintext crosses the backend boundary as standard base64, applied exactly
//! once on the way out and removed exactly once on the way back.

use crate::error::{KmsError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode raw bytes for a JSON text field.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a JSON text field back to raw bytes.
pub fn decode_payload(text: &str) -> Result<Vec<u8>> {
    STANDARD.decode(text.trim()).map_err(|e| KmsError::Encoding {
        message: format!("backend payload is not valid base64: {e}"),
    })
}
