// src/transport/client.rs
//! Persistent mTLS connection pool with JSON helpers.
//!
//! Builds a `reqwest::Client` from a PEM cert+key `Identity` plus a
//! custom CA `Certificate`. This is the Federation's one and only HTTP
//! client — every inter-node call goes through it — with JSON
//! GET/POST/PUT/DELETE helpers on top.

use crate::error::{Error, Result};
use serde::Serialize;
use std::time::Duration;

/// mTLS HTTP client. The failure semantics are deliberate: callers
/// never see a transport error, only an empty body or `None` response,
/// leaving retry policy to the caller (e.g. the next heartbeat tick).
#[derive(Clone)]
pub struct MtlsClient {
    inner: reqwest::Client,
}

impl MtlsClient {
    /// Build the client from a client cert+key PEM pair and a CA cert
    /// PEM via `Identity::from_pem` plus `Certificate::from_pem`.
    pub fn new(cert_pem: &[u8], key_pem: &[u8], ca_pem: &[u8]) -> Result<Self> {
        let identity = reqwest::Identity::from_pem(&[cert_pem, key_pem].concat())
            .map_err(|e| Error::Transport(format!("failed to build mTLS identity: {e}")))?;
        let ca_cert = reqwest::Certificate::from_pem(ca_pem)
            .map_err(|e| Error::Transport(format!("failed to parse CA certificate: {e}")))?;

        let inner = reqwest::Client::builder()
            .identity(identity)
            .add_root_certificate(ca_cert)
            .tls_built_in_root_certs(false)
            .http2_prior_knowledge()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| Error::Transport(format!("failed to build mTLS HTTP client: {e}")))?;

        Ok(Self { inner })
    }

    /// GET and return the full response body, or an empty body on any
    /// error.
    pub async fn get_bytes(&self, url: &str) -> Vec<u8> {
        match self.inner.get(url).send().await {
            Ok(resp) => resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default(),
            Err(e) => {
                tracing::debug!("mTLS GET {url} failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn get_json<T: serde::de::DeserializeOwned + Default>(&self, url: &str) -> T {
        let bytes = self.get_bytes(url).await;
        if bytes.is_empty() {
            return T::default();
        }
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    async fn send_json_body(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &impl Serialize,
    ) -> Vec<u8> {
        let result = self
            .inner
            .request(method, url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await;
        match result {
            Ok(resp) => resp.bytes().await.map(|b| b.to_vec()).unwrap_or_default(),
            Err(e) => {
                tracing::debug!("mTLS request to {url} failed: {e}");
                Vec::new()
            }
        }
    }

    pub async fn post_json(&self, url: &str, body: &impl Serialize) -> Vec<u8> {
        self.send_json_body(reqwest::Method::POST, url, body).await
    }

    pub async fn put_json(&self, url: &str, body: &impl Serialize) -> Vec<u8> {
        self.send_json_body(reqwest::Method::PUT, url, body).await
    }

    pub async fn delete_json(&self, url: &str, body: &impl Serialize) -> Vec<u8> {
        self.send_json_body(reqwest::Method::DELETE, url, body).await
    }
}
