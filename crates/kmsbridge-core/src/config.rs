//! Plugin configuration and tunables.
//!
//! `PluginConfig` is read once from the JSON file named on the command line
//! and never mutated afterwards. Fixed protocol values and timeouts live as
//! associated constants.

use crate::error::{KmsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Backend transport configuration.
pub struct BackendConfig;

impl BackendConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
    pub const ENCRYPT_PATH: &'static str = "api/1.0/symm_keyid/op/encrypt/";
    pub const DECRYPT_PATH: &'static str = "api/1.0/symm_keyid/op/decrypt/";
    pub const DEFAULT_SCHEME: &'static str = "https";
    /// Plaintext sent by the optional status probe.
    pub const PROBE_PAYLOAD: &'static [u8] = b"kmsbridge-healthz";
}

/// Values reported on the plugin wire protocol.
pub struct ProtocolConfig;

impl ProtocolConfig {
    pub const STATUS_VERSION: &'static str = "v2";
    pub const HEALTHZ_OK: &'static str = "ok";
    pub const LEGACY_API_VERSION: &'static str = "v1beta1";
    pub const RUNTIME_NAME: &'static str = "KeyControlKMS";
    pub const RUNTIME_VERSION: &'static str = env!("CARGO_PKG_VERSION");
}

/// Plugin configuration loaded from the JSON config file.
///
/// ```json
/// {
///   "kmsServer": "keycontrol.example:443",
///   "certFile": "/etc/kms/client.pem",
///   "caCertFile": "/etc/kms/cacert.pem",
///   "keyId": "cluster-secrets"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Backend address, either `host:port` or a full `http(s)://` URL.
    pub kms_server: String,
    /// PEM file with the client certificate chain (and the key unless `key_file` is set).
    pub cert_file: PathBuf,
    /// PEM file with the client private key. Defaults to `cert_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    /// PEM bundle of CA certificates trusted for the backend.
    pub ca_cert_file: PathBuf,
    /// Key name sent to the backend as `keyid_name` and reported to the orchestrator.
    pub key_id: String,
}

impl PluginConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| KmsError::io_with_path(e, path))?;

        let config: PluginConfig = serde_json::from_str(&content).map_err(|e| KmsError::Json {
            message: format!("Failed to parse config from {}: {}", path.display(), e),
            source: Some(e),
        })?;

        config.validate()?;
        debug!(
            "Loaded config from {} (server {}, key {})",
            path.display(),
            config.kms_server,
            config.key_id
        );
        Ok(config)
    }

    /// Check that every required field is present and the server address parses.
    pub fn validate(&self) -> Result<()> {
        if self.kms_server.trim().is_empty() {
            return Err(KmsError::validation("kmsServer", "must not be empty"));
        }
        if self.key_id.trim().is_empty() {
            return Err(KmsError::validation("keyId", "must not be empty"));
        }
        if self.cert_file.as_os_str().is_empty() {
            return Err(KmsError::validation("certFile", "must not be empty"));
        }
        if self.ca_cert_file.as_os_str().is_empty() {
            return Err(KmsError::validation("caCertFile", "must not be empty"));
        }
        self.endpoint_base()?;
        Ok(())
    }

    /// Path of the client private key PEM.
    pub fn key_path(&self) -> &Path {
        self.key_file.as_deref().unwrap_or(&self.cert_file)
    }

    /// Base URL of the backend, always ending in `/`.
    pub fn endpoint_base(&self) -> Result<Url> {
        let raw = self.kms_server.trim();
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("{}://{}", BackendConfig::DEFAULT_SCHEME, raw)
        };

        let mut url = Url::parse(&candidate)
            .map_err(|e| KmsError::validation("kmsServer", format!("{raw:?}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(KmsError::validation(
                "kmsServer",
                format!("unsupported scheme {:?}", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(KmsError::validation("kmsServer", "missing host"));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}
