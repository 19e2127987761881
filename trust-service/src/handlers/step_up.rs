use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use trust_core::error::AppError;

use crate::{
    dtos::step_up::{
        GrantCheckResponse, GrantConsumeResponse, GrantKeyRequest, GrantRequest, GrantResponse,
        InvalidateRequest, InvalidateResponse,
    },
    middleware::ClientIp,
    models::GrantOutcome,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Attach the acting subject to the request span.
pub(crate) fn record_subject(subject_id: &str) {
    tracing::Span::current().record("user_id", subject_id);
}

/// POST /v1/step-up/grants
pub async fn request_grant(
    State(state): State<AppState>,
    client_ip: ClientIp,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<Response, AppError> {
    record_subject(&req.subject);
    let password = Password::new(req.password);
    let outcome = state
        .step_up
        .request_grant(
            &req.subject,
            &password,
            req.action,
            &req.target,
            client_ip.as_deref(),
        )
        .await?;

    let status = match &outcome {
        GrantOutcome::Granted { .. } => StatusCode::OK,
        GrantOutcome::Denied { .. } => StatusCode::UNAUTHORIZED,
        GrantOutcome::LockedOut { .. } => StatusCode::TOO_MANY_REQUESTS,
    };
    let retry_after = match &outcome {
        GrantOutcome::LockedOut {
            retry_after_seconds,
            ..
        } => Some(*retry_after_seconds),
        _ => None,
    };

    let mut response = (status, Json(GrantResponse::from(outcome))).into_response();
    if let Some(seconds) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    }
    Ok(response)
}

/// POST /v1/step-up/grants/check
pub async fn check_grant(
    State(state): State<AppState>,
    client_ip: ClientIp,
    ValidatedJson(req): ValidatedJson<GrantKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    record_subject(&req.subject);
    let valid = state
        .step_up
        .has_valid_grant(&req.subject, req.action, &req.target, client_ip.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(GrantCheckResponse { valid })))
}

/// POST /v1/step-up/grants/consume
pub async fn consume_grant(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<GrantKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    record_subject(&req.subject);
    let consumed = state
        .step_up
        .consume_grant(&req.subject, req.action, &req.target)
        .await?;
    Ok((StatusCode::OK, Json(GrantConsumeResponse { consumed })))
}

/// DELETE /v1/step-up/grants
pub async fn invalidate_grants(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<InvalidateRequest>,
) -> Result<impl IntoResponse, AppError> {
    record_subject(&req.subject);
    let invalidated = state.step_up.invalidate_all(&req.subject).await?;
    Ok((StatusCode::OK, Json(InvalidateResponse { invalidated })))
}
