//! kmsbridge core - KeyControl backend access for the Kubernetes KMS plugin.
//!
//! This crate holds everything behind the wire protocol: configuration, the
//! mutual-TLS HTTP client for the KeyControl symmetric-key API, and the
//! [`KmsService`] operation set the gRPC adapters call. It has no knowledge of
//! gRPC or sockets.
//!
//! # Example
//!
//! ```rust,ignore
//! use kmsbridge_core::{
//!     BackendConfig, EncryptRequest, KeyControlClient, KeyControlKmsService, KmsService,
//!     PluginConfig, RequestContext, StatusMode,
//! };
//!
//! #[tokio::main]
//! async fn main() -> kmsbridge_core::Result<()> {
//!     let config = PluginConfig::load("/etc/kmsbridge/config.json")?;
//!     let client = KeyControlClient::from_config(&config, BackendConfig::REQUEST_TIMEOUT)?;
//!     let service = KeyControlKmsService::new(client, StatusMode::Local);
//!
//!     let request = EncryptRequest { plaintext: b"teststring".to_vec() };
//!     let result = service.encrypt(&RequestContext::new(), request).await?;
//!     println!("encrypted with {}", result.key_id);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod bundle;
pub mod cancel;
pub mod config;
pub mod encoding;
pub mod error;
pub mod models;
pub mod service;

pub use backend::{KeyControlClient, TlsMaterial};
pub use bundle::CertificateBundle;
pub use cancel::CancellationToken;
pub use config::{BackendConfig, PluginConfig, ProtocolConfig};
pub use error::{KmsError, Result};
pub use models::{
    DecryptRequest, DecryptResult, EncryptRequest, EncryptResult, RequestContext, StatusResult,
};
pub use service::{KeyControlKmsService, KmsService, StatusMode};
