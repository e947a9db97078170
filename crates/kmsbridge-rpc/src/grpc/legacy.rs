//! `v1beta1.KeyManagementService` adapter.
//!
//! The legacy shape has no uid, key id or status call. Version is answered
//! locally without touching the backend.

use super::proto::v1beta1::key_management_service_server::{
    KeyManagementService, KeyManagementServiceServer,
};
use super::proto::v1beta1::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, VersionRequest,
    VersionResponse,
};
use super::{request_context, run_call};
use kmsbridge_core::{self as kms, CancellationToken, KmsService, ProtocolConfig};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Serves the legacy plugin API on top of a [`KmsService`].
#[derive(Clone)]
pub struct LegacyKmsAdapter {
    service: Arc<dyn KmsService>,
    halt: CancellationToken,
}

impl LegacyKmsAdapter {
    pub fn new(service: Arc<dyn KmsService>, halt: CancellationToken) -> Self {
        Self { service, halt }
    }

    pub fn into_server(self) -> KeyManagementServiceServer<Self> {
        KeyManagementServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl KeyManagementService for LegacyKmsAdapter {
    async fn version(
        &self,
        request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        debug!(
            "Version request received (caller version {:?})",
            request.get_ref().version
        );
        Ok(Response::new(VersionResponse {
            version: ProtocolConfig::LEGACY_API_VERSION.to_string(),
            runtime_name: ProtocolConfig::RUNTIME_NAME.to_string(),
            runtime_version: ProtocolConfig::RUNTIME_VERSION.to_string(),
        }))
    }

    async fn encrypt(
        &self,
        request: Request<EncryptRequest>,
    ) -> Result<Response<EncryptResponse>, Status> {
        let ctx = request_context(&request, "");
        let plaintext = request.into_inner().plain;
        info!("Legacy encrypt request received");

        let result = run_call(
            "encrypt",
            &ctx,
            &self.halt,
            self.service
                .encrypt(&ctx, kms::EncryptRequest { plaintext }),
        )
        .await?;

        Ok(Response::new(EncryptResponse {
            cipher: result.ciphertext,
        }))
    }

    async fn decrypt(
        &self,
        request: Request<DecryptRequest>,
    ) -> Result<Response<DecryptResponse>, Status> {
        let ctx = request_context(&request, "");
        let ciphertext = request.into_inner().cipher;
        info!("Legacy decrypt request received");

        let request = kms::DecryptRequest {
            ciphertext,
            key_id: None,
        };
        let result = run_call(
            "decrypt",
            &ctx,
            &self.halt,
            self.service.decrypt(&ctx, request),
        )
        .await?;

        Ok(Response::new(DecryptResponse {
            plain: result.plaintext,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmsbridge_core::{
        BackendConfig, KeyControlClient, KeyControlKmsService, PluginConfig, StatusMode,
    };
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tonic::Code;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    /// Echoes whatever text it is given back as the opposite field.
    struct EchoBackend;

    impl Respond for EchoBackend {
        fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            match body.get("plain_text") {
                Some(plain) => {
                    ResponseTemplate::new(200).set_body_json(json!({"cipher_text": plain}))
                }
                None => ResponseTemplate::new(200)
                    .set_body_json(json!({"plain_text": body["cipher_text"]})),
            }
        }
    }

    fn adapter_for(kms_server: String) -> LegacyKmsAdapter {
        let config = PluginConfig {
            kms_server,
            cert_file: PathBuf::from("/unused/client.pem"),
            key_file: None,
            ca_cert_file: PathBuf::from("/unused/cacert.pem"),
            key_id: "k1".to_string(),
        };
        let client = KeyControlClient::with_http_client(
            reqwest::Client::new(),
            &config,
            BackendConfig::REQUEST_TIMEOUT,
        )
        .unwrap();
        let service = KeyControlKmsService::new(client, StatusMode::Local);
        LegacyKmsAdapter::new(Arc::new(service), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_version_is_answered_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let adapter = adapter_for(server.uri());

        let version = adapter
            .version(Request::new(VersionRequest {
                version: "v1beta1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(version.version, "v1beta1");
        assert_eq!(version.runtime_name, "KeyControlKMS");
        assert_eq!(version.runtime_version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(EchoBackend)
            .mount(&server)
            .await;
        let adapter = adapter_for(server.uri());

        let cipher = adapter
            .encrypt(Request::new(EncryptRequest {
                version: "v1beta1".to_string(),
                plain: b"secret data".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner()
            .cipher;
        assert!(!cipher.is_empty());

        let plain = adapter
            .decrypt(Request::new(DecryptRequest {
                version: "v1beta1".to_string(),
                cipher,
            }))
            .await
            .unwrap()
            .into_inner()
            .plain;
        assert_eq!(plain, b"secret data");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // Bind and release a port so nothing is listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let adapter = adapter_for(format!("http://127.0.0.1:{port}"));

        let err = adapter
            .encrypt(Request::new(EncryptRequest {
                version: "v1beta1".to_string(),
                plain: b"abc".to_vec(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }
}
