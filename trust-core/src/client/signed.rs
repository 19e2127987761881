//! Outbound HTTP client that signs every request for the receiving service's
//! signature middleware.

use crate::utils::signature::RequestSigner;
use anyhow::{Context, Result};
use reqwest::{header::CONTENT_TYPE, Method, Response};
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SignedHttpClient {
    http: reqwest::Client,
    base_url: String,
    signer: RequestSigner,
}

impl SignedHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        signer: RequestSigner,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Sign and send `body` to `path`.
    ///
    /// `path` is signed verbatim, so it must be the bare path the receiver
    /// sees: no scheme, host or query string.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        extra_headers: &[(&str, &str)],
    ) -> Result<Response> {
        if !path.starts_with('/') || path.contains('?') {
            anyhow::bail!("Signed path must be absolute and carry no query: {}", path);
        }

        let signed = self
            .signer
            .sign(method.as_str(), path, &body)
            .map_err(|e| anyhow::anyhow!("Failed to sign request: {}", e))?;

        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path));
        for (name, value) in signed.pairs().into_iter().chain(extra_headers.iter().copied()) {
            request = request.header(name, value);
        }

        tracing::debug!(
            request_id = %signed.request_id,
            method = %method,
            path = %path,
            "Sending signed request"
        );

        request
            .body(body)
            .send()
            .await
            .with_context(|| format!("Signed request to {} failed", path))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        extra_headers: &[(&str, &str)],
    ) -> Result<Response> {
        let body = serde_json::to_vec(payload).context("Failed to encode request body")?;
        let mut headers = vec![(CONTENT_TYPE.as_str(), "application/json")];
        headers.extend_from_slice(extra_headers);
        self.send(Method::POST, path, body, &headers).await
    }
}
