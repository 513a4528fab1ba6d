use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Webhook signature or callback token did not check out. Security
    /// boundary: nothing may be mutated once this is raised.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// An authenticated webhook carried an external reference this service
    /// can never decode. The webhook handler acknowledges these so the
    /// gateway stops retrying; nothing is mutated.
    #[error("Malformed external reference: {0}")]
    MalformedReference(String),

    #[error("Invalid booking transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Insufficient credits on package")]
    InsufficientCredits,

    #[error("Package is not usable: {0}")]
    PackageNotActive(String),

    #[error("Refund would exceed package total")]
    WouldExceedTotal,

    #[error("Package does not cover this class category")]
    PackageCategoryMismatch,

    #[error("Class is full")]
    ClassFull,

    #[error("Class category or location does not match the booking")]
    ClassTypeMismatch,

    #[error("Class has already started")]
    AlreadyStarted,

    /// Transient reconciliation failure. Surfaced as a 500 so the gateway
    /// redelivers; no partial state is assumed committed.
    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    #[error("External service error: {0}")]
    External(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred")
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, msg.as_str()),
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::VerificationFailed(ref msg) => {
                tracing::warn!("Webhook verification failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "Verification failed")
            }
            AppError::MalformedReference(ref msg) => {
                tracing::warn!("Malformed external reference: {}", msg);
                (StatusCode::BAD_REQUEST, "Malformed external reference")
            }
            AppError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                "Booking is not in a state that allows this operation",
            ),
            AppError::InsufficientCredits => (
                StatusCode::PAYMENT_REQUIRED,
                "Not enough credits remaining on the package",
            ),
            AppError::PackageNotActive(ref msg) => (StatusCode::CONFLICT, msg.as_str()),
            AppError::WouldExceedTotal => {
                tracing::error!("Credit refund would exceed package total");
                (StatusCode::CONFLICT, "Credit refund would exceed package total")
            }
            AppError::PackageCategoryMismatch => (
                StatusCode::CONFLICT,
                "Package does not cover this class category",
            ),
            AppError::ClassFull => (StatusCode::CONFLICT, "Class is full"),
            AppError::ClassTypeMismatch => (
                StatusCode::CONFLICT,
                "Class category or location does not match the booking",
            ),
            AppError::AlreadyStarted => (StatusCode::CONFLICT, "Class has already started"),
            AppError::Reconcile(ref msg) => {
                tracing::error!("Reconciliation error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Reconciliation error")
            }
            AppError::External(ref msg) => {
                tracing::error!("External service error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.as_str())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
