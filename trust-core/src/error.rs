use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned for every authentication or integrity failure.
///
/// The underlying cause is logged, never returned, so callers cannot learn
/// which check rejected them.
pub const GENERIC_DENIAL: &str = "Authentication failed";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Integrity check failed: {0}")]
    IntegrityError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::AuthError(err) => {
                tracing::warn!(reason = %err, "Request authentication rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    GENERIC_DENIAL.to_string(),
                    None,
                )
            }
            AppError::IntegrityError(err) => {
                tracing::error!(reason = %err, "Integrity check failed");
                (
                    StatusCode::UNAUTHORIZED,
                    GENERIC_DENIAL.to_string(),
                    None,
                )
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
            AppError::ServiceUnavailable(err) => {
                tracing::error!(error = %err, "Dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable".to_string(),
                    None,
                )
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                    None,
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn auth_errors_do_not_leak_reason() {
        let res = AppError::AuthError(anyhow::anyhow!("signature mismatch")).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(res).await;
        assert_eq!(body["error"], GENERIC_DENIAL);
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn integrity_and_auth_errors_render_identically() {
        let auth = body_json(AppError::AuthError(anyhow::anyhow!("stale")).into_response()).await;
        let integrity =
            body_json(AppError::IntegrityError(anyhow::anyhow!("tag")).into_response()).await;
        assert_eq!(auth, integrity);
    }

    #[tokio::test]
    async fn unavailable_dependency_is_opaque() {
        let res = AppError::ServiceUnavailable(anyhow::anyhow!("redis://10.0.0.4 refused"))
            .into_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(res).await;
        assert_eq!(body["error"], "Service unavailable");
    }
}
