//! Captcha-gated testnet faucet.
//!
//! A grant request flows through:
//! - captcha verification against an external oracle
//! - per-IP and per-destination admission control
//! - a signed EIP-155 transfer from the funder account, confirmed on chain
//!
//! Admission state is in memory; a background task decays per-IP counters.

pub mod admission;
pub mod api;
pub mod config;
pub mod decay;
pub mod disburser;
pub mod error;
pub mod ledger;
pub mod service;
pub mod transaction;
pub mod verification;

pub use admission::{AdmissionController, InMemoryAdmission};
pub use config::FaucetConfig;
pub use decay::spawn_limit_decay;
pub use disburser::{Disburser, DisburserSettings};
pub use error::{AdmissionDenial, DisbursementError, FaucetError, FaucetResult, LedgerError, VerificationFailure};
pub use ledger::{JsonRpcLedgerClient, LedgerClient};
pub use service::{FaucetService, FaucetStatus, GrantRequest, GrantResult, RequestContext};
pub use verification::{RecaptchaClient, VerificationClient, VerificationPolicy, VerificationResult};
