use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt::Display;
use tracing::{error, warn};

use crate::usecases::{
    payment_intents::PaymentError, payment_reconciler::WebhookError, rentals::RentalError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Json(ErrorResponse {
        code: status.as_u16(),
        message: message.into(),
    });

    (status, body).into_response()
}

/// Client mistakes are logged as warnings, server-side failures as errors.
pub fn log_failure(operation: &str, status: StatusCode, err: &impl Display) {
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "{operation} failed");
    } else {
        warn!(status = status.as_u16(), error = %err, "{operation} rejected");
    }
}

impl IntoResponse for RentalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            // Don't leak internal error detail to client
            RentalError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        error_response(status, message)
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            PaymentError::Internal(_) => "Internal server error".to_string(),
            PaymentError::PaymentProcessor(_) => "Payment service unavailable".to_string(),
            other => other.to_string(),
        };

        error_response(status, message)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let message = match self {
            WebhookError::Signature(_) => "Invalid signature",
            WebhookError::InvalidPayload(_) => "Invalid payload",
            WebhookError::Internal(_) => "Webhook processing error",
        };

        error_response(self.status_code(), message)
    }
}
