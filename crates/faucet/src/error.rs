//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Faucet service errors, as seen by callers.
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed precondition: {0}")]
    Precondition(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(#[from] VerificationFailure),

    #[error("Funded too recently: {0}")]
    AdmissionDenied(#[from] AdmissionDenial),

    #[error("Could not send transaction: {0}")]
    DisbursementFailed(#[from] DisbursementError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    /// Stable classification a client can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::InvalidArgument(_) => "INVALID_ARGUMENT",
            FaucetError::Precondition(_) => "FAILED_PRECONDITION",
            FaucetError::VerificationFailed(_) | FaucetError::AdmissionDenied(_) => "PERMISSION_DENIED",
            FaucetError::DisbursementFailed(_) | FaucetError::Internal(_) => "INTERNAL",
            FaucetError::Config(_) => "CONFIGURATION",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            FaucetError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            FaucetError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            FaucetError::VerificationFailed(_) | FaucetError::AdmissionDenied(_) => StatusCode::FORBIDDEN,
            FaucetError::DisbursementFailed(_) | FaucetError::Config(_) | FaucetError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message returned to the caller. Verification detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            FaucetError::VerificationFailed(_) => "Failed captcha verification".to_string(),
            FaucetError::AdmissionDenied(_) => "Funded too recently".to_string(),
            FaucetError::Config(_) => "Faucet is misconfigured".to_string(),
            other => other.to_string(),
        }
    }
}

/// Reasons a verification oracle result is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationFailure {
    #[error("could not check response: {0}")]
    OracleUnavailable(String),

    #[error("unsuccessful captcha request, error codes: {error_codes:?}")]
    Unsuccessful { error_codes: Vec<String> },

    #[error("captcha score too low ({score} < {minimum})")]
    ScoreTooLow { score: f64, minimum: f64 },

    #[error("captcha challenge too old ({age_secs}s)")]
    ChallengeExpired { age_secs: i64 },

    #[error("action was {action}, wanted {expected}")]
    ActionMismatch { action: String, expected: String },

    #[error("expected hostname ({hostname}) to end in {expected_suffix}")]
    HostnameMismatch { hostname: String, expected_suffix: String },
}

/// Reasons the admission policy refuses a grant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDenial {
    #[error("destination already funded")]
    AlreadyGranted,

    #[error("source over request limit ({count}/{limit})")]
    IdentityLimitReached { count: u32, limit: u32 },
}

/// Errors reported by a ledger client.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

/// Failures of a single transfer, by stage.
#[derive(Error, Debug)]
pub enum DisbursementError {
    #[error("could not get nonce: {0}")]
    SequenceFetch(#[source] LedgerError),

    #[error("could not sign tx: {0}")]
    Signing(String),

    #[error("could not send tx: {0}")]
    Submission(#[source] LedgerError),

    #[error("could not wait for tx to mine: {0}")]
    Polling(#[source] LedgerError),

    #[error("tx not mined within {0:?}")]
    Timeout(Duration),

    #[error("wait for tx cancelled by shutdown")]
    Cancelled,
}

impl DisbursementError {
    /// True for ledger I/O problems a caller may retry; false for
    /// configuration-class failures.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DisbursementError::Signing(_))
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.public_message(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        (self.status(), body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
