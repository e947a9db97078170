//! KMS operation service.
//!
//! [`KmsService`] is the single capability both wire adapters call into.
//! [`KeyControlKmsService`] implements it on top of [`KeyControlClient`]: it
//! owns the payload encoding and stamps the configured key id on results.

use crate::backend::KeyControlClient;
use crate::config::{BackendConfig, ProtocolConfig};
use crate::encoding::{decode_payload, encode_payload};
use crate::error::{KmsError, Result};
use crate::models::{
    DecryptRequest, DecryptResult, EncryptRequest, EncryptResult, RequestContext, StatusResult,
};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Encrypt, decrypt and status operations, independent of the wire shape.
#[async_trait]
pub trait KmsService: Send + Sync + 'static {
    /// Report version, health and the active key id.
    async fn status(&self, ctx: &RequestContext) -> Result<StatusResult>;

    /// Encrypt raw plaintext bytes.
    async fn encrypt(&self, ctx: &RequestContext, request: EncryptRequest) -> Result<EncryptResult>;

    /// Decrypt ciphertext previously returned by [`KmsService::encrypt`].
    async fn decrypt(&self, ctx: &RequestContext, request: DecryptRequest) -> Result<DecryptResult>;
}

/// How `status` determines health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusMode {
    /// Report healthy without contacting the backend.
    #[default]
    Local,
    /// Encrypt a probe payload; a failure degrades the health string.
    Probe,
}

/// [`KmsService`] backed by a KeyControl server.
pub struct KeyControlKmsService {
    client: KeyControlClient,
    status_mode: StatusMode,
}

impl KeyControlKmsService {
    pub fn new(client: KeyControlClient, status_mode: StatusMode) -> Self {
        debug!(
            "KMS service ready (key {}, status mode {:?})",
            client.key_id(),
            status_mode
        );
        Self {
            client,
            status_mode,
        }
    }

    pub fn key_id(&self) -> &str {
        self.client.key_id()
    }

    async fn probe_health(&self, ctx: &RequestContext) -> String {
        let probe = encode_payload(BackendConfig::PROBE_PAYLOAD);
        match self.client.encrypt(ctx, &probe).await {
            Ok(_) => ProtocolConfig::HEALTHZ_OK.to_string(),
            Err(e) => {
                warn!("Status probe against backend failed: {}", e);
                format!("backend unreachable: {e}")
            }
        }
    }
}

#[async_trait]
impl KmsService for KeyControlKmsService {
    async fn status(&self, ctx: &RequestContext) -> Result<StatusResult> {
        let healthz = match self.status_mode {
            StatusMode::Local => ProtocolConfig::HEALTHZ_OK.to_string(),
            StatusMode::Probe => self.probe_health(ctx).await,
        };

        Ok(StatusResult {
            version: ProtocolConfig::STATUS_VERSION.to_string(),
            healthz,
            key_id: self.key_id().to_string(),
        })
    }

    async fn encrypt(&self, ctx: &RequestContext, request: EncryptRequest) -> Result<EncryptResult> {
        let encoded = encode_payload(&request.plaintext);
        let ciphertext = self.client.encrypt(ctx, &encoded).await?;

        debug!(
            uid = ctx.uid_or_dash(),
            "Encrypted {} byte payload with key {}",
            request.plaintext.len(),
            self.key_id()
        );
        Ok(EncryptResult {
            ciphertext: ciphertext.into_bytes(),
            key_id: self.key_id().to_string(),
        })
    }

    async fn decrypt(&self, ctx: &RequestContext, request: DecryptRequest) -> Result<DecryptResult> {
        if request.ciphertext.is_empty() {
            return Err(KmsError::validation("ciphertext", "must not be empty"));
        }
        // Ciphertext is the backend's own text token, forwarded as-is.
        let ciphertext = std::str::from_utf8(&request.ciphertext)
            .map_err(|_| KmsError::validation("ciphertext", "is not backend ciphertext text"))?;

        if let Some(key_id) = request.key_id.as_deref() {
            if !key_id.is_empty() && key_id != self.key_id() {
                debug!(
                    uid = ctx.uid_or_dash(),
                    "Decrypt requested for key {}, configured key is {}",
                    key_id,
                    self.key_id()
                );
            }
        }

        let encoded = self.client.decrypt(ctx, ciphertext).await?;
        let plaintext = decode_payload(&encoded)?;

        debug!(
            uid = ctx.uid_or_dash(),
            "Decrypted payload to {} bytes",
            plaintext.len()
        );
        Ok(DecryptResult { plaintext })
    }
}
