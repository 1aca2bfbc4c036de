use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ParaphraseError;

#[derive(Debug, Deserialize)]
pub struct ParaphraseBody {
    pub text: String,
    /// 0-100, defaults to 50. Out of range values are rejected, not clamped.
    #[serde(default)]
    pub strength: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParaphraseResponse {
    pub paraphrase: String,
    pub original_text: String,
    pub strength: u8,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: String,
    pub model: String,
    pub endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub paraphrase: String,
    pub health: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            paraphrase: "/paraphrase (POST)".to_string(),
            health: "/health (GET)".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Error half of every handler: a status code plus a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                detail: detail.into(),
                state: None,
            },
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.body.state = Some(state.into());
        self
    }
}

impl From<ParaphraseError> for ApiError {
    fn from(err: ParaphraseError) -> Self {
        let status = match &err {
            ParaphraseError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ParaphraseError::ServiceUnavailable(_) | ParaphraseError::ResourceLoadFailure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ParaphraseError::InferenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
