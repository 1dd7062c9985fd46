//! Error taxonomy for the credential and session lifecycle.
//!
//! Every failure a handler can surface lives here, with its HTTP status
//! decided once so the same condition never maps to two different codes.
//! Display strings double as the client-facing `message` field; internal
//! causes are logged server-side and never serialized.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::account::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("All fields are required")]
    MissingFields,

    #[error("User already exists")]
    DuplicateAccount,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Password checked out but the address was never confirmed. Carries the
    /// account id so the client can route straight to the verification page.
    #[error("Email not verified")]
    EmailNotVerified { account_id: String },

    #[error("User is already verified")]
    AlreadyVerified,

    /// Wrong, expired, and unknown codes are deliberately indistinguishable.
    #[error("Invalid or expired verification code")]
    InvalidVerificationCode,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Missing required Google user info")]
    MissingFederatedInfo,

    #[error("User not found")]
    AccountNotFound,

    #[error("Unauthorized - no token provided")]
    NoSession,

    #[error("Unauthorized - invalid token")]
    InvalidSession,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingFields
            | AuthError::DuplicateAccount
            | AuthError::InvalidCredentials
            | AuthError::AlreadyVerified
            | AuthError::InvalidVerificationCode
            | AuthError::InvalidResetToken
            | AuthError::MissingFederatedInfo => StatusCode::BAD_REQUEST,
            AuthError::NoSession | AuthError::InvalidSession => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified { .. } => StatusCode::FORBIDDEN,
            AuthError::AccountNotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateAccount,
            StoreError::NotFound => AuthError::AccountNotFound,
            StoreError::Database(e) => AuthError::Internal(e.into()),
            StoreError::Corrupt(msg) => AuthError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(source) = &self {
            tracing::error!(error = ?source, "request failed with internal error");
        }
        let body = match &self {
            AuthError::EmailNotVerified { account_id } => serde_json::json!({
                "success": false,
                "message": self.to_string(),
                "redirectToVerify": true,
                "userId": account_id,
            }),
            _ => serde_json::json!({
                "success": false,
                "message": self.to_string(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}
