//! Faucet service core logic

use crate::admission::AdmissionController;
use crate::disburser::Disburser;
use crate::error::{FaucetError, FaucetResult};
use crate::verification::{VerificationClient, VerificationPolicy};
use axum::http::HeaderMap;
use chrono::Utc;
use drip_common::utils::converter::format_units;
use drip_common::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Grant request as received from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRequest {
    #[serde(rename = "walletAddress", alias = "destinationAccount")]
    pub destination_account: String,
    #[serde(rename = "captchaResponse", alias = "verificationToken")]
    pub verification_token: String,
}

/// Successful grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantResult {
    /// Granted amount in whole units, e.g. `32.5`
    pub amount: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
}

/// Per-request metadata the transport hands over.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub forwarded_for: Option<String>,
}

impl RequestContext {
    /// First entry of the `X-Forwarded-For` header, if any.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded_for = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty());
        Self { forwarded_for }
    }

    pub fn with_forwarded_for(ip: impl Into<String>) -> Self {
        Self {
            forwarded_for: Some(ip.into()),
        }
    }

    fn source_identity(&self) -> FaucetResult<&str> {
        self.forwarded_for
            .as_deref()
            .ok_or_else(|| FaucetError::Precondition("Could not get IP address from request: metadata not ok".to_string()))
    }
}

/// Funder overview for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub address: String,
    pub balance: String,
    pub funding_amount: String,
    pub chain_id: u64,
}

/// Reservation on a destination taken by `try_claim`.
///
/// Released when dropped unless the grant was recorded, so a request future
/// dropped mid-transfer does not leave the destination locked.
struct ClaimGuard {
    admission: Arc<dyn AdmissionController>,
    destination: Option<String>,
}

impl ClaimGuard {
    fn new(admission: Arc<dyn AdmissionController>, destination: &str) -> Self {
        Self {
            admission,
            destination: Some(destination.to_string()),
        }
    }

    async fn release(mut self) {
        if let Some(destination) = self.destination.take() {
            self.admission.release(&destination).await;
        }
    }

    fn disarm(mut self) {
        self.destination = None;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let Some(destination) = self.destination.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let admission = self.admission.clone();
                warn!(destination = %destination, "Grant abandoned, releasing claim");
                handle.spawn(async move { admission.release(&destination).await });
            }
            Err(_) => error!(destination = %destination, "No runtime to release claim on"),
        }
    }
}

/// Faucet service
pub struct FaucetService {
    verifier: Arc<dyn VerificationClient>,
    policy: VerificationPolicy,
    admission: Arc<dyn AdmissionController>,
    disburser: Arc<Disburser>,
    decimals: u32,
    claim_before_disburse: bool,
}

impl FaucetService {
    pub fn new(
        verifier: Arc<dyn VerificationClient>,
        policy: VerificationPolicy,
        admission: Arc<dyn AdmissionController>,
        disburser: Arc<Disburser>,
        decimals: u32,
    ) -> Self {
        Self {
            verifier,
            policy,
            admission,
            disburser,
            decimals,
            claim_before_disburse: false,
        }
    }

    /// Reserve the destination before sending and release it if the grant
    /// fails, closing the window where two concurrent requests for the same
    /// destination both pass admission.
    pub fn with_claims(mut self, enabled: bool) -> Self {
        self.claim_before_disburse = enabled;
        self
    }

    /// Run one grant request through verification, admission and transfer.
    pub async fn handle_grant_request(&self, ctx: &RequestContext, req: GrantRequest) -> FaucetResult<GrantResult> {
        let destination = req.destination_account.trim();
        if destination.is_empty() {
            return Err(FaucetError::InvalidArgument("wallet address is required".to_string()));
        }
        let to: Address = destination
            .parse()
            .map_err(|e| FaucetError::InvalidArgument(format!("invalid wallet address: {}", e)))?;

        let ip_address = ctx.source_identity().map_err(|e| {
            error!("Could not fetch IP from request");
            e
        })?;

        self.verify(ip_address, &req.verification_token, destination).await?;

        // Check if funded too recently
        self.admission.allow(ip_address, destination).await?;

        let claim = if self.claim_before_disburse {
            self.admission.try_claim(destination).await?;
            Some(ClaimGuard::new(self.admission.clone(), destination))
        } else {
            None
        };

        let tx_hash = match self.disburser.transfer_and_confirm(&to).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), destination, "Could not send transaction");
                if let Some(claim) = claim {
                    claim.release().await;
                }
                return Err(e.into());
            }
        };

        self.admission.record(ip_address, destination).await;
        if let Some(claim) = claim {
            claim.disarm();
        }

        info!(tx_hash = %tx_hash, requester_address = destination, "Funded successfully");
        Ok(GrantResult {
            amount: format_units(self.disburser.settings().amount, self.decimals),
            transaction_hash: tx_hash.to_string(),
        })
    }

    async fn verify(&self, ip_address: &str, token: &str, destination: &str) -> FaucetResult<()> {
        let verdict = match self.verifier.check(ip_address, token).await {
            Ok(result) => self.policy.evaluate(&result, destination, Utc::now()),
            Err(e) => Err(e),
        };
        verdict.map_err(|reason| {
            warn!(ip_address, reason = %reason, "Failed captcha verification");
            FaucetError::from(reason)
        })
    }

    /// Funder address and balance.
    pub async fn get_status(&self) -> FaucetResult<FaucetStatus> {
        let funder = self.disburser.funder();
        let balance = self
            .disburser
            .ledger()
            .balance_of(&funder)
            .await
            .map_err(|e| FaucetError::Internal(format!("could not fetch balance: {}", e)))?;

        Ok(FaucetStatus {
            address: funder.to_string(),
            balance: format_units(balance, self.decimals),
            funding_amount: format_units(self.disburser.settings().amount, self.decimals),
            chain_id: self.disburser.settings().chain_id,
        })
    }
}
