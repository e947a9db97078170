//! `v2.KeyManagementService` adapter.

use super::proto::v2::key_management_service_server::{
    KeyManagementService, KeyManagementServiceServer,
};
use super::proto::v2::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, StatusRequest,
    StatusResponse,
};
use super::{request_context, run_call};
use kmsbridge_core::{self as kms, CancellationToken, KmsService};
use std::collections::HashMap;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Serves the current plugin API on top of a [`KmsService`].
#[derive(Clone)]
pub struct KmsAdapter {
    service: Arc<dyn KmsService>,
    halt: CancellationToken,
}

impl KmsAdapter {
    pub fn new(service: Arc<dyn KmsService>, halt: CancellationToken) -> Self {
        Self { service, halt }
    }

    pub fn into_server(self) -> KeyManagementServiceServer<Self> {
        KeyManagementServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl KeyManagementService for KmsAdapter {
    async fn status(
        &self,
        request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let ctx = request_context(&request, "");
        debug!("Status request received");

        let status = run_call("status", &ctx, &self.halt, self.service.status(&ctx)).await?;
        Ok(Response::new(StatusResponse {
            version: status.version,
            healthz: status.healthz,
            key_id: status.key_id,
        }))
    }

    async fn encrypt(
        &self,
        request: Request<EncryptRequest>,
    ) -> Result<Response<EncryptResponse>, Status> {
        let ctx = request_context(&request, &request.get_ref().uid);
        let EncryptRequest { plaintext, .. } = request.into_inner();
        info!(uid = ctx.uid_or_dash(), "Encrypt request received");

        let result = run_call(
            "encrypt",
            &ctx,
            &self.halt,
            self.service
                .encrypt(&ctx, kms::EncryptRequest { plaintext }),
        )
        .await?;

        Ok(Response::new(EncryptResponse {
            ciphertext: result.ciphertext,
            key_id: result.key_id,
            annotations: HashMap::new(),
        }))
    }

    async fn decrypt(
        &self,
        request: Request<DecryptRequest>,
    ) -> Result<Response<DecryptResponse>, Status> {
        let ctx = request_context(&request, &request.get_ref().uid);
        let DecryptRequest {
            ciphertext, key_id, ..
        } = request.into_inner();
        info!(uid = ctx.uid_or_dash(), "Decrypt request received");

        let request = kms::DecryptRequest {
            ciphertext,
            key_id: (!key_id.is_empty()).then_some(key_id),
        };
        let result = run_call(
            "decrypt",
            &ctx,
            &self.halt,
            self.service.decrypt(&ctx, request),
        )
        .await?;

        Ok(Response::new(DecryptResponse {
            plaintext: result.plaintext,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use kmsbridge_core::{
        BackendConfig, KeyControlClient, KeyControlKmsService, PluginConfig, StatusMode,
    };
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tonic::Code;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer, timeout: Duration) -> (KmsAdapter, CancellationToken) {
        let config = PluginConfig {
            kms_server: server.uri(),
            cert_file: PathBuf::from("/unused/client.pem"),
            key_file: None,
            ca_cert_file: PathBuf::from("/unused/cacert.pem"),
            key_id: "k1".to_string(),
        };
        let client = KeyControlClient::with_http_client(reqwest::Client::new(), &config, timeout)
            .unwrap();
        let service = KeyControlKmsService::new(client, StatusMode::Local);
        let halt = CancellationToken::new();
        (KmsAdapter::new(Arc::new(service), halt.clone()), halt)
    }

    fn encrypt_request(plaintext: &[u8]) -> Request<EncryptRequest> {
        Request::new(EncryptRequest {
            plaintext: plaintext.to_vec(),
            uid: "uid-1".to_string(),
        })
    }

    #[tokio::test]
    async fn test_status_reports_key_id() {
        let server = MockServer::start().await;
        let (adapter, _) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let status = adapter
            .status(Request::new(StatusRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(status.version, "v2");
        assert_eq!(status.healthz, "ok");
        assert_eq!(status.key_id, "k1");
    }

    #[tokio::test]
    async fn test_encrypt_returns_backend_ciphertext_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1.0/symm_keyid/op/encrypt/"))
            .and(body_json(json!({
                "plain_text": STANDARD.encode(b"teststring"),
                "keyid_name": "k1"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"cipher_text": "ABC123"})),
            )
            .mount(&server)
            .await;
        let (adapter, _) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let response = adapter
            .encrypt(encrypt_request(b"teststring"))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.ciphertext, b"ABC123");
        assert_eq!(response.key_id, "k1");
        assert!(response.annotations.is_empty());
    }

    #[tokio::test]
    async fn test_decrypt_returns_raw_plaintext() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/1.0/symm_keyid/op/decrypt/"))
            .and(body_json(json!({"cipher_text": "ABC123", "keyid_name": "k1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"plain_text": STANDARD.encode(b"teststring")})),
            )
            .mount(&server)
            .await;
        let (adapter, _) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let response = adapter
            .decrypt(Request::new(DecryptRequest {
                ciphertext: b"ABC123".to_vec(),
                uid: "uid-2".to_string(),
                key_id: "k1".to_string(),
                annotations: HashMap::new(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.plaintext, b"teststring");
    }

    #[tokio::test]
    async fn test_backend_error_does_not_poison_later_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (adapter, _) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let err = adapter.encrypt(encrypt_request(b"abc")).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);

        let status = adapter
            .status(Request::new(StatusRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(status.key_id, "k1");
    }

    #[tokio::test]
    async fn test_empty_ciphertext_is_invalid_argument() {
        let server = MockServer::start().await;
        let (adapter, _) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let err = adapter
            .decrypt(Request::new(DecryptRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_caller_deadline_bounds_backend_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"cipher_text": "late"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let (adapter, _) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let mut request = encrypt_request(b"abc");
        request
            .metadata_mut()
            .insert("grpc-timeout", "200m".parse().unwrap());

        let started = Instant::now();
        let err = adapter.encrypt(request).await.unwrap_err();

        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_halt_cancels_in_flight_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"cipher_text": "late"}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;
        let (adapter, halt) = adapter_for(&server, BackendConfig::REQUEST_TIMEOUT);

        let call = tokio::spawn(async move { adapter.encrypt(encrypt_request(b"abc")).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        halt.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
    }
}
