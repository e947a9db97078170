//! gRPC adapters for the Kubernetes KMS plugin API.
//!
//! Two wire shapes are served side by side on the same socket:
//! - `v1beta1.KeyManagementService` (legacy: Version/Encrypt/Decrypt)
//! - `v2.KeyManagementService` (current: Status/Encrypt/Decrypt)
//!
//! Both are thin translations onto the same
//! [`KmsService`](kmsbridge_core::KmsService). Every call runs under the
//! server's hard-stop token and carries the caller's deadline.

mod current;
mod legacy;

pub use current::KmsAdapter;
pub use legacy::LegacyKmsAdapter;

use kmsbridge_core::{CancellationToken, KmsError, RequestContext};
use std::future::Future;
use std::time::Duration;
use tonic::{Request, Status};
use tracing::warn;

/// Generated protobuf and service code.
pub mod proto {
    #[allow(dead_code, clippy::all)]
    pub mod v1beta1 {
        tonic::include_proto!("v1beta1");
    }

    #[allow(dead_code, clippy::all)]
    pub mod v2 {
        tonic::include_proto!("v2");
    }
}

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Build the per-call context from request metadata.
pub(crate) fn request_context<T>(request: &Request<T>, uid: &str) -> RequestContext {
    let mut ctx = RequestContext::new().with_uid(uid);
    if let Some(timeout) = request
        .metadata()
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout)
    {
        ctx = ctx.with_timeout(timeout);
    }
    ctx
}

/// Parse a `grpc-timeout` header value: up to 8 digits followed by a unit.
pub(crate) fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 3600),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

/// Map a core error to the status returned for this call.
pub(crate) fn status_from_error(err: &KmsError) -> Status {
    match err {
        KmsError::Validation { .. } | KmsError::Encoding { .. } => {
            Status::invalid_argument(err.to_string())
        }
        KmsError::Timeout(_) => Status::deadline_exceeded(err.to_string()),
        KmsError::Cancelled => Status::cancelled(err.to_string()),
        e if e.is_transient() => Status::unavailable(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

/// Run one call, failing it with `Cancelled` if the server is hard-stopped.
pub(crate) async fn run_call<T>(
    operation: &'static str,
    ctx: &RequestContext,
    halt: &CancellationToken,
    call: impl Future<Output = kmsbridge_core::Result<T>>,
) -> Result<T, Status> {
    let outcome = tokio::select! {
        biased;
        _ = halt.cancelled() => Err(KmsError::Cancelled),
        result = call => result,
    };

    outcome.map_err(|e| {
        warn!(uid = ctx.uid_or_dash(), "{} request failed: {}", operation, e);
        status_from_error(&e)
    })
}
