/**
 * ERREURS KERNEL - Taxonomie et mapping HTTP
 *
 * - ValidationError : payload incomplet ou mal typé → 400, message lisible
 * - KernelError::Internal : échec inattendu (sérialisation...) → 500, loggé
 *
 * Enveloppe JSON commune : {"status": "error", "message": "..."}
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("no data provided")]
    NoData,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("missing wallet")]
    MissingWallet,
    // le nom du champ sert aux logs, pas au client
    #[error("missing field")]
    MissingField { field: &'static str },
    #[error("bad type")]
    BadType { field: &'static str },
}

impl ValidationError {
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field } | Self::BadType { field } => Some(field),
            Self::MissingWallet => Some("wallet"),
            Self::NoData | Self::Malformed(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl KernelError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Validation(e) => e.to_string(),
            Self::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                "Internal server error".to_string()
            }
        };
        let body = serde_json::json!({ "status": "error", "message": message });
        (self.status(), Json(body)).into_response()
    }
}
