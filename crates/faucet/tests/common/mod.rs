#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use drip_common::{Address, TxHash};
use drip_faucet::transaction::signing_key_from_hex;
use drip_faucet::{
    Disburser, DisburserSettings, FaucetService, InMemoryAdmission, LedgerClient, LedgerError, VerificationClient,
    VerificationFailure, VerificationPolicy, VerificationResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const FUNDER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const CAPTCHA_HOST: &str = "faucet.example.org";
pub const GRANT_WEI: u128 = 32_500_000_000_000_000_000;
pub const CHAIN_ID: u64 = 5;

pub fn destination(n: u8) -> String {
    format!("0x{}", hex::encode([n; 20]))
}

/// Oracle that answers every token with a verdict built for the action it is
/// told to expect.
pub struct MockVerifier {
    pub calls: AtomicUsize,
    pub score: Mutex<f64>,
    pub action: Mutex<Option<String>>,
}

impl MockVerifier {
    pub fn passing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            score: Mutex::new(0.95),
            action: Mutex::new(None),
        }
    }

    pub fn with_score(score: f64) -> Self {
        let verifier = Self::passing();
        *verifier.score.lock().unwrap() = score;
        verifier
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationClient for MockVerifier {
    /// Tokens carry the action they were issued for.
    async fn check(&self, _source_identity: &str, token: &str) -> Result<VerificationResult, VerificationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let action = self
            .action
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| token.to_string());
        Ok(VerificationResult {
            success: true,
            score: *self.score.lock().unwrap(),
            challenge_time: Utc::now() - chrono::Duration::seconds(5),
            action,
            hostname: CAPTCHA_HOST.to_string(),
            error_codes: vec![],
        })
    }
}

/// In-memory ledger; transactions are mined after `pending_polls` polls.
#[derive(Default)]
pub struct MockLedger {
    pub calls: AtomicUsize,
    pub nonce: Mutex<u64>,
    pub submitted: Mutex<Vec<Vec<u8>>>,
    pub polls: AtomicUsize,
    pub pending_polls: usize,
    pub fail_submit: bool,
}

impl MockLedger {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn next_sequence_number(&self, _account: &Address) -> Result<u64, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.nonce.lock().unwrap())
    }

    async fn submit(&self, raw_tx: &[u8]) -> Result<TxHash, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_submit {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }
        *self.nonce.lock().unwrap() += 1;
        self.submitted.lock().unwrap().push(raw_tx.to_vec());
        Ok(TxHash(keccak_hash::keccak(raw_tx).0))
    }

    async fn poll_by_identifier(&self, _tx_hash: &TxHash) -> Result<bool, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(polls > self.pending_polls)
    }

    async fn balance_of(&self, _account: &Address) -> Result<u128, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(1_000 * GRANT_WEI)
    }
}

pub struct Harness {
    pub service: FaucetService,
    pub verifier: Arc<MockVerifier>,
    pub ledger: Arc<MockLedger>,
    pub admission: Arc<InMemoryAdmission>,
    pub shutdown: watch::Sender<bool>,
}

pub fn settings() -> DisburserSettings {
    DisburserSettings {
        amount: GRANT_WEI,
        gas_limit: 40_000,
        gas_price: 1_000_000_000,
        chain_id: CHAIN_ID,
        poll_interval: Duration::from_millis(5),
        confirmation_timeout: Some(Duration::from_secs(5)),
    }
}

pub fn harness(verifier: MockVerifier, ledger: MockLedger) -> Harness {
    drip_common::utils::logging::init_test_logging();

    let verifier = Arc::new(verifier);
    let ledger = Arc::new(ledger);
    let admission = Arc::new(InMemoryAdmission::new(5));
    let (shutdown, shutdown_rx) = watch::channel(false);

    let disburser = Arc::new(Disburser::new(
        ledger.clone(),
        signing_key_from_hex(FUNDER_KEY).unwrap(),
        settings(),
        shutdown_rx,
    ));
    let policy = VerificationPolicy {
        min_score: 0.9,
        expected_hostname_suffix: "example.org".to_string(),
        max_age: Duration::from_secs(120),
    };
    let service = FaucetService::new(verifier.clone(), policy, admission.clone(), disburser, 18);

    Harness {
        service,
        verifier,
        ledger,
        admission,
        shutdown,
    }
}
