//! Captcha verification: the oracle client and the acceptance policy.

use crate::error::VerificationFailure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Verdict returned by the verification oracle for one token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(rename = "challenge_ts", default = "epoch")]
    pub challenge_time: DateTime<Utc>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Human-verification oracle.
#[async_trait]
pub trait VerificationClient: Send + Sync {
    async fn check(&self, source_identity: &str, token: &str) -> Result<VerificationResult, VerificationFailure>;
}

/// reCAPTCHA v3 `siteverify` client.
pub struct RecaptchaClient {
    verify_url: String,
    secret: String,
    client: reqwest::Client,
}

impl RecaptchaClient {
    pub fn new(verify_url: String, secret: String) -> Self {
        Self {
            verify_url,
            secret,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VerificationClient for RecaptchaClient {
    async fn check(&self, source_identity: &str, token: &str) -> Result<VerificationResult, VerificationFailure> {
        info!(ip_address = %source_identity, "Verifying captcha...");

        let form = [
            ("secret", self.secret.as_str()),
            ("response", token),
            ("remoteip", source_identity),
        ];

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| VerificationFailure::OracleUnavailable(e.to_string()))?;

        let result: VerificationResult = response
            .error_for_status()
            .map_err(|e| VerificationFailure::OracleUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerificationFailure::OracleUnavailable(format!("invalid response: {}", e)))?;

        debug!(?result, "Captcha verdict");
        Ok(result)
    }
}

/// Acceptance criteria applied to every oracle verdict.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub min_score: f64,
    pub expected_hostname_suffix: String,
    pub max_age: Duration,
}

impl VerificationPolicy {
    /// Accept only a successful, high-score, fresh verdict whose action names
    /// `destination` and whose hostname ends in the expected suffix.
    pub fn evaluate(
        &self,
        result: &VerificationResult,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationFailure> {
        if !result.success {
            return Err(VerificationFailure::Unsuccessful {
                error_codes: result.error_codes.clone(),
            });
        }
        if result.score < self.min_score {
            return Err(VerificationFailure::ScoreTooLow {
                score: result.score,
                minimum: self.min_score,
            });
        }

        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        let age = now.signed_duration_since(result.challenge_time);
        if age > max_age {
            return Err(VerificationFailure::ChallengeExpired {
                age_secs: age.num_seconds(),
            });
        }

        if result.action != destination {
            return Err(VerificationFailure::ActionMismatch {
                action: result.action.clone(),
                expected: destination.to_string(),
            });
        }
        if !result.hostname.ends_with(&self.expected_hostname_suffix) {
            return Err(VerificationFailure::HostnameMismatch {
                hostname: result.hostname.clone(),
                expected_suffix: self.expected_hostname_suffix.clone(),
            });
        }

        Ok(())
    }
}
