//! KeyControl backend access.
//!
//! This module provides:
//! - Mutual-TLS material loading and the shared HTTP transport
//! - The encrypt/decrypt HTTP client
//! - The backend's JSON request and reply shapes

mod client;
mod tls;
pub mod wire;

pub use client::KeyControlClient;
pub use tls::TlsMaterial;
