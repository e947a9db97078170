//! HTTP client for the KeyControl symmetric-key API.
//!
//! Each operation is one JSON POST; there is no retry. The request budget is
//! the backend timeout or the time left before the caller's deadline,
//! whichever is shorter. Dropping the returned future aborts the HTTP request.

use super::tls::TlsMaterial;
use super::wire::{DecryptBody, DecryptReply, EncryptBody, EncryptReply};
use crate::config::{BackendConfig, PluginConfig};
use crate::error::{KmsError, Result};
use crate::models::RequestContext;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Stateless client for the backend's encrypt/decrypt endpoints.
#[derive(Debug, Clone)]
pub struct KeyControlClient {
    http: Client,
    encrypt_url: Url,
    decrypt_url: Url,
    key_id: String,
    timeout: Duration,
}

impl KeyControlClient {
    /// Build the mutual-TLS transport from the configured certificate material.
    pub fn from_config(config: &PluginConfig, timeout: Duration) -> Result<Self> {
        let http = TlsMaterial::load(config)?.build_client(timeout)?;
        Self::with_http_client(http, config, timeout)
    }

    /// Use an already built `reqwest::Client` for the transport.
    pub fn with_http_client(http: Client, config: &PluginConfig, timeout: Duration) -> Result<Self> {
        let base = config.endpoint_base()?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| KmsError::validation("kmsServer", e.to_string()))
        };

        Ok(Self {
            encrypt_url: join(BackendConfig::ENCRYPT_PATH)?,
            decrypt_url: join(BackendConfig::DECRYPT_PATH)?,
            http,
            key_id: config.key_id.clone(),
            timeout,
        })
    }

    /// Key name sent as `keyid_name`.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypt an already encoded plaintext, returning the backend's ciphertext text.
    pub async fn encrypt(&self, ctx: &RequestContext, encoded_plaintext: &str) -> Result<String> {
        let body = EncryptBody {
            plain_text: encoded_plaintext,
            keyid_name: &self.key_id,
        };
        let reply: EncryptReply = self
            .post_json("encrypt", &self.encrypt_url, &body, ctx)
            .await?;

        match reply.cipher_text {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(KmsError::MalformedResponse {
                operation: "encrypt".to_string(),
                message: "missing cipher_text".to_string(),
            }),
        }
    }

    /// Decrypt a ciphertext text, returning the backend's encoded plaintext.
    pub async fn decrypt(&self, ctx: &RequestContext, ciphertext: &str) -> Result<String> {
        let body = DecryptBody {
            cipher_text: ciphertext,
            keyid_name: &self.key_id,
        };
        let reply: DecryptReply = self
            .post_json("decrypt", &self.decrypt_url, &body, ctx)
            .await?;

        reply.plain_text.ok_or_else(|| KmsError::MalformedResponse {
            operation: "decrypt".to_string(),
            message: "missing plain_text".to_string(),
        })
    }

    /// Time allowed for one backend round-trip under this call's deadline.
    fn request_budget(&self, ctx: &RequestContext) -> Result<Duration> {
        match ctx.remaining() {
            Some(remaining) if remaining.is_zero() => Err(KmsError::Timeout(Duration::ZERO)),
            Some(remaining) => Ok(remaining.min(self.timeout)),
            None => Ok(self.timeout),
        }
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        operation: &str,
        url: &Url,
        body: &B,
        ctx: &RequestContext,
    ) -> Result<R> {
        let budget = self.request_budget(ctx)?;
        debug!(
            uid = ctx.uid_or_dash(),
            "POST {} ({} budget {:?})", url, operation, budget
        );

        let response = self
            .http
            .post(url.clone())
            .json(body)
            .timeout(budget)
            .send()
            .await
            .map_err(|e| transport_error(operation, budget, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body_len = response.bytes().await.map(|b| b.len()).unwrap_or(0);
            warn!(
                uid = ctx.uid_or_dash(),
                "KeyControl {} failed with HTTP {} ({} byte body)",
                operation,
                status.as_u16(),
                body_len
            );
            return Err(KmsError::BackendStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(operation, budget, e))?;

        serde_json::from_slice(&bytes).map_err(|e| KmsError::MalformedResponse {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}

fn transport_error(operation: &str, budget: Duration, err: reqwest::Error) -> KmsError {
    if err.is_timeout() {
        KmsError::Timeout(budget)
    } else {
        KmsError::Network {
            message: format!("POST {} failed: {}", operation, err),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer, key_id: &str) -> PluginConfig {
        PluginConfig {
            kms_server: server.uri(),
            cert_file: PathBuf::from("/unused/client.pem"),
            key_file: None,
            ca_cert_file: PathBuf::from("/unused/cacert.pem"),
            key_id: key_id.to_string(),
        }
    }

    fn test_client(server: &MockServer, timeout: Duration) -> KeyControlClient {
        KeyControlClient::with_http_client(Client::new(), &test_config(server, "prod-key"), timeout)
            .unwrap()
    }

    #[tokio::test]
    async fn test_encrypt_posts_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1.0/symm_keyid/op/encrypt/"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "plain_text": "dGVzdHN0cmluZw==",
                "keyid_name": "prod-key"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keyid_name": "prod-key",
                "keyid": "7f3a",
                "result": "success",
                "cipher_text": "ABC123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let cipher = client
            .encrypt(&RequestContext::new(), "dGVzdHN0cmluZw==")
            .await
            .unwrap();
        assert_eq!(cipher, "ABC123");
    }

    #[tokio::test]
    async fn test_decrypt_posts_cipher_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1.0/symm_keyid/op/decrypt/"))
            .and(body_json(serde_json::json!({
                "cipher_text": "ABC123",
                "keyid_name": "prod-key"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"plain_text": "dGVzdHN0cmluZw=="})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let plain = client.decrypt(&RequestContext::new(), "ABC123").await.unwrap();
        assert_eq!(plain, "dGVzdHN0cmluZw==");
    }

    #[tokio::test]
    async fn test_non_200_is_backend_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let err = client
            .encrypt(&RequestContext::new(), "YWJj")
            .await
            .unwrap_err();
        assert!(matches!(err, KmsError::BackendStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_created_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"cipher_text": "x"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let err = client
            .encrypt(&RequestContext::new(), "YWJj")
            .await
            .unwrap_err();
        assert!(matches!(err, KmsError::BackendStatus { status: 201, .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let err = client.decrypt(&RequestContext::new(), "ABC").await.unwrap_err();
        assert!(matches!(err, KmsError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_cipher_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "success"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let err = client.encrypt(&RequestContext::new(), "YWJj").await.unwrap_err();
        assert!(matches!(err, KmsError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_backend_timeout_applies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"cipher_text": "late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_millis(100));
        let err = client.encrypt(&RequestContext::new(), "YWJj").await.unwrap_err();
        assert!(matches!(err, KmsError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_caller_deadline_shorter_than_backend_timeout_wins() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"cipher_text": "late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server, Duration::from_secs(30));
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(150));
        let started = std::time::Instant::now();
        let err = client.encrypt(&ctx, "YWJj").await.unwrap_err();

        assert!(matches!(err, KmsError::Timeout(budget) if budget <= Duration::from_millis(150)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_expired_deadline_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server, BackendConfig::REQUEST_TIMEOUT);
        let ctx = RequestContext::new().with_timeout(Duration::ZERO);
        let err = client.encrypt(&ctx, "YWJj").await.unwrap_err();
        assert!(matches!(err, KmsError::Timeout(d) if d == Duration::ZERO));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = PluginConfig {
            kms_server: format!("http://127.0.0.1:{port}"),
            cert_file: PathBuf::from("/unused/client.pem"),
            key_file: None,
            ca_cert_file: PathBuf::from("/unused/cacert.pem"),
            key_id: "prod-key".to_string(),
        };

        let client =
            KeyControlClient::with_http_client(Client::new(), &config, Duration::from_secs(2))
                .unwrap();
        let err = client.encrypt(&RequestContext::new(), "YWJj").await.unwrap_err();
        assert!(matches!(err, KmsError::Network { .. }));
    }
}
