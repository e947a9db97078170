//! KeyControl certificate bundle.
//!
//! KeyControl hands out client credentials as a JSON bundle whose
//! `certificates` map holds base64-encoded PEM files. `cacert.pem` is the CA
//! that signed the server; the other entry is the client certificate and key
//! the plugin presents.

use crate::error::{KmsError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Bundle entry holding the CA certificate.
pub const CA_CERT_ENTRY: &str = "cacert.pem";

/// Parsed certificate bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateBundle {
    certificates: BTreeMap<String, String>,
}

impl CertificateBundle {
    /// Read a bundle from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| KmsError::io_with_path(e, path))?;
        Self::from_json(&content)
    }

    /// Parse bundle JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| KmsError::Json {
            message: format!("Invalid certificate bundle: {e}"),
            source: Some(e),
        })
    }

    /// Decoded client certificate PEM (the entry that is not the CA).
    pub fn client_certificate(&self) -> Result<String> {
        let (name, value) = self
            .certificates
            .iter()
            .find(|(name, _)| name.as_str() != CA_CERT_ENTRY)
            .ok_or_else(|| KmsError::validation("certificates", "no client certificate entry"))?;
        decode_entry(name, value)
    }

    /// Decoded CA certificate PEM.
    pub fn ca_certificate(&self) -> Result<String> {
        let value = self.certificates.get(CA_CERT_ENTRY).ok_or_else(|| {
            KmsError::validation("certificates", format!("no {CA_CERT_ENTRY} entry"))
        })?;
        decode_entry(CA_CERT_ENTRY, value)
    }
}

fn decode_entry(name: &str, value: &str) -> Result<String> {
    let bytes = STANDARD.decode(value.trim()).map_err(|e| KmsError::Encoding {
        message: format!("{name}: {e}"),
    })?;
    let text = String::from_utf8(bytes).map_err(|e| KmsError::Encoding {
        message: format!("{name}: {e}"),
    })?;
    Ok(text.trim().to_string())
}
