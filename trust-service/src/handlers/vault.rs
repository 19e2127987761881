use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use secrecy::{ExposeSecret, SecretString};
use trust_core::error::AppError;

use super::step_up::record_subject;
use crate::{
    dtos::vault::{InspectRequest, InspectResponse, SealRequest, SealResponse},
    utils::ValidatedJson,
    vault::mask_secret,
    AppState,
};

/// POST /v1/vault/secrets
pub async fn seal_secret(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SealRequest>,
) -> Result<impl IntoResponse, AppError> {
    record_subject(&req.subject);
    let secret = SecretString::new(req.secret);
    let sealed = state.vault.seal(&req.subject, &req.target, &secret).await?;
    Ok((StatusCode::CREATED, Json(SealResponse { sealed })))
}

/// POST /v1/vault/secrets/inspect
pub async fn inspect_secret(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<InspectRequest>,
) -> Result<impl IntoResponse, AppError> {
    record_subject(&req.subject);
    let secret = state
        .vault
        .open(&req.subject, &req.target, &req.sealed)
        .await?;
    let masked = mask_secret(secret.expose_secret(), 2);
    Ok((StatusCode::OK, Json(InspectResponse { masked })))
}
