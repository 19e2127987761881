use crate::error::AppError;
use crate::utils::signature::{
    RequestVerifier, REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use http_body_util::{BodyExt, Limited};
use metrics::counter;
use std::fmt;
use std::sync::Arc;

/// Largest body the middleware will buffer for digesting.
pub const MAX_SIGNED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A request the middleware refused.
#[derive(Debug, Clone)]
pub struct SignatureRejection {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub reason: &'static str,
}

/// Notified of every rejected request, e.g. to feed an audit trail.
#[axum::async_trait]
pub trait RejectionObserver: Send + Sync {
    async fn signature_rejected(&self, rejection: SignatureRejection);
}

#[derive(Clone)]
pub struct SignatureConfig {
    pub require_signatures: bool,
    pub excluded_paths: Vec<String>,
    pub verifier: RequestVerifier,
    pub observer: Option<Arc<dyn RejectionObserver>>,
}

impl fmt::Debug for SignatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureConfig")
            .field("require_signatures", &self.require_signatures)
            .field("excluded_paths", &self.excluded_paths)
            .field("verifier", &self.verifier)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl SignatureConfig {
    pub fn new(verifier: RequestVerifier) -> Self {
        Self {
            require_signatures: true,
            excluded_paths: Vec::new(),
            verifier,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RejectionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_excluded_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.excluded_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| path == p)
    }
}

/// Rejects any request whose HMAC headers do not verify.
///
/// Every rejection surfaces as the same `AuthError`; the specific reason is
/// only logged.
pub async fn signature_validation_middleware<S>(
    State(state): State<S>,
    req: Request,
    next: Next,
) -> Result<Response, AppError>
where
    S: AsRef<SignatureConfig> + Clone + Send + Sync + 'static,
{
    let config = state.as_ref();
    let path = req.uri().path();

    if config.is_excluded(path) {
        return Ok(next.run(req).await);
    }

    if !config.require_signatures && !req.headers().contains_key(SIGNATURE_HEADER) {
        return Ok(next.run(req).await);
    }

    let timestamp = header_value(req.headers(), TIMESTAMP_HEADER);
    let signature = header_value(req.headers(), SIGNATURE_HEADER);
    let request_id = header_value(req.headers(), REQUEST_ID_HEADER).unwrap_or_else(|| "-".into());

    let (parts, body) = req.into_parts();
    let method = parts.method.as_str();
    let path = parts.uri.path();

    let bytes = match Limited::new(body, MAX_SIGNED_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            reject(config, &request_id, method, path, "body").await;
            return Err(AppError::AuthError(anyhow::anyhow!(
                "Failed to read body: {}",
                e
            )));
        }
    };

    if let Err(reason) = config.verifier.verify(
        method,
        path,
        &bytes,
        timestamp.as_deref(),
        signature.as_deref(),
    ) {
        tracing::warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            reason = %reason,
            "Rejected unsigned or badly signed request"
        );
        reject(config, &request_id, method, path, reason_label(&reason)).await;
        return Err(AppError::AuthError(anyhow::anyhow!(reason)));
    }

    tracing::debug!(request_id = %request_id, path = %path, "Request signature verified");

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}

async fn reject(
    config: &SignatureConfig,
    request_id: &str,
    method: &str,
    path: &str,
    reason: &'static str,
) {
    counter!("signature_rejections_total", "reason" => reason).increment(1);
    if let Some(observer) = &config.observer {
        observer
            .signature_rejected(SignatureRejection {
                request_id: request_id.to_string(),
                method: method.to_string(),
                path: path.to_string(),
                reason,
            })
            .await;
    }
}

fn reason_label(reason: &crate::utils::signature::SignatureError) -> &'static str {
    use crate::utils::signature::SignatureError::*;
    match reason {
        MissingHeader(_) => "missing_header",
        MalformedTimestamp => "malformed_timestamp",
        OutsideWindow { .. } => "outside_window",
        Mismatch => "mismatch",
        InvalidKey => "invalid_key",
    }
}

fn header_value(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
