use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::models::{
    ApiError, Endpoints, HealthResponse, ParaphraseBody, ParaphraseResponse, RootResponse,
};
use crate::app_state::AppState;
use crate::error::ParaphraseError;
use crate::llm::decoding::{Strength, DEFAULT_STRENGTH};
use crate::llm::resource::ModelStatus;
use crate::llm::service::ParaphraseRequest;

pub async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "online".to_string(),
        model: state.model_name.clone(),
        endpoints: Endpoints::default(),
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let status = state.resource().state();
    if status != ModelStatus::Ready {
        return Err(
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Model not loaded").with_state(status.label()),
        );
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: true,
    }))
}

pub async fn paraphrase(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ParaphraseBody>, JsonRejection>,
) -> Result<Json<ParaphraseResponse>, ApiError> {
    // Every shape problem with the body is a validation error, including bad JSON syntax.
    let Json(payload) = payload.map_err(|rejection| ApiError::unprocessable(rejection.body_text()))?;
    tracing::debug!("Paraphrase request: {:?}", payload);

    let strength = payload.strength.unwrap_or(DEFAULT_STRENGTH as i64);
    if !(Strength::MIN.value() as i64..=Strength::MAX.value() as i64).contains(&strength) {
        return Err(ApiError::unprocessable(format!(
            "strength must be between 0 and 100, got {strength}"
        )));
    }

    let request = ParaphraseRequest::new(payload.text, strength);
    let service = state.service.clone();
    let task = tokio::task::spawn_blocking(move || service.paraphrase(&request));

    let joined = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
            tracing::error!("Paraphrase timed out after {:?}", limit);
            ParaphraseError::InferenceFailure(format!("generation timed out after {}s", limit.as_secs()))
        })?,
        None => task.await,
    };
    let result = joined.map_err(|e| ParaphraseError::InferenceFailure(e.to_string()))??;

    Ok(Json(ParaphraseResponse {
        paraphrase: result.paraphrase,
        original_text: result.original_text,
        strength: result.strength.value(),
    }))
}
