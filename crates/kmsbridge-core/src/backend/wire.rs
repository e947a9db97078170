//! KeyControl symmetric-key API JSON shapes.
//!
//! These mirror the backend's wire format and are kept separate from the
//! plugin's own request/result types; either side may change independently.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/1.0/symm_keyid/op/encrypt/`.
#[derive(Serialize)]
pub struct EncryptBody<'a> {
    pub plain_text: &'a str,
    pub keyid_name: &'a str,
}

/// Body of `POST /api/1.0/symm_keyid/op/decrypt/`.
#[derive(Serialize)]
pub struct DecryptBody<'a> {
    pub cipher_text: &'a str,
    pub keyid_name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct EncryptReply {
    #[serde(default)]
    pub keyid_name: Option<String>,
    #[serde(default)]
    pub keyid: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub cipher_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecryptReply {
    #[serde(default)]
    pub keyid_name: Option<String>,
    #[serde(default)]
    pub keyid: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub plain_text: Option<String>,
}
