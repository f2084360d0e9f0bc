//! Builds, signs, sends and confirms grant transfers from the funder account.

use crate::error::DisbursementError;
use crate::ledger::LedgerClient;
use crate::transaction::{address_from_signing_key, LegacyTransaction};
use drip_common::{Address, TxHash};
use k256::ecdsa::SigningKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

/// Fixed parameters of every grant transfer.
#[derive(Debug, Clone)]
pub struct DisburserSettings {
    pub amount: u128,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub chain_id: u64,
    pub poll_interval: Duration,
    /// `None` waits for inclusion indefinitely.
    pub confirmation_timeout: Option<Duration>,
}

/// Sends grants from a single funder account.
pub struct Disburser {
    ledger: Arc<dyn LedgerClient>,
    signing_key: SigningKey,
    funder: Address,
    settings: DisburserSettings,
    /// Held from nonce fetch through submission so concurrent grants never
    /// reuse a nonce.
    nonce_lock: Mutex<()>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Disburser {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signing_key: SigningKey,
        settings: DisburserSettings,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let funder = address_from_signing_key(&signing_key);
        Self {
            ledger,
            signing_key,
            funder,
            settings,
            nonce_lock: Mutex::new(()),
            shutdown_rx,
        }
    }

    pub fn funder(&self) -> Address {
        self.funder
    }

    pub fn settings(&self) -> &DisburserSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Send the configured amount to `to` and wait until it is mined.
    pub async fn transfer_and_confirm(&self, to: &Address) -> Result<TxHash, DisbursementError> {
        let tx_hash = self.send(to).await?;
        self.wait_for_inclusion(&tx_hash).await?;
        Ok(tx_hash)
    }

    async fn send(&self, to: &Address) -> Result<TxHash, DisbursementError> {
        let _guard = self.nonce_lock.lock().await;

        let nonce = self
            .ledger
            .next_sequence_number(&self.funder)
            .await
            .map_err(DisbursementError::SequenceFetch)?;

        let tx = LegacyTransaction {
            nonce,
            gas_price: self.settings.gas_price,
            gas_limit: self.settings.gas_limit,
            to: *to,
            value: self.settings.amount,
            data: Vec::new(),
        };
        let signed = tx
            .sign(&self.signing_key, self.settings.chain_id)
            .map_err(|e| DisbursementError::Signing(e.to_string()))?;
        let tx_hash = signed.hash();

        let submitted = self
            .ledger
            .submit(&signed.raw())
            .await
            .map_err(DisbursementError::Submission)?;
        if submitted != tx_hash {
            debug!(local = %tx_hash, remote = %submitted, "Node reported a different tx hash");
        }

        info!(tx_hash = %tx_hash, nonce, to = %to, "Transaction sent");
        Ok(tx_hash)
    }

    async fn wait_for_inclusion(&self, tx_hash: &TxHash) -> Result<(), DisbursementError> {
        match self.settings.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll_until_mined(tx_hash))
                .await
                .map_err(|_| DisbursementError::Timeout(limit))?,
            None => self.poll_until_mined(tx_hash).await,
        }
    }

    async fn poll_until_mined(&self, tx_hash: &TxHash) -> Result<(), DisbursementError> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                return Err(DisbursementError::Cancelled);
            }
            let mined = self
                .ledger
                .poll_by_identifier(tx_hash)
                .await
                .map_err(DisbursementError::Polling)?;
            if mined {
                debug!(tx_hash = %tx_hash, "Transaction mined");
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        return Err(DisbursementError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::transaction::signing_key_from_hex;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    const KEY: &str = "4646464646464646464646464646464646464646464646464646464646464646";

    /// Ledger that mines a transaction after `pending_polls` polls.
    #[derive(Default)]
    struct ScriptedLedger {
        nonce: StdMutex<u64>,
        submitted: StdMutex<Vec<Vec<u8>>>,
        polls: StdMutex<u32>,
        pending_polls: u32,
        fail_nonce: bool,
        fail_poll: bool,
        /// Yield after handing out a nonce so other transfers can interleave.
        yield_after_fetch: bool,
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn next_sequence_number(&self, _account: &Address) -> Result<u64, LedgerError> {
            if self.fail_nonce {
                return Err(LedgerError::Transport("connection refused".into()));
            }
            let nonce = *self.nonce.lock().unwrap();
            if self.yield_after_fetch {
                tokio::task::yield_now().await;
            }
            Ok(nonce)
        }

        async fn submit(&self, raw_tx: &[u8]) -> Result<TxHash, LedgerError> {
            *self.nonce.lock().unwrap() += 1;
            self.submitted.lock().unwrap().push(raw_tx.to_vec());
            Ok(TxHash(keccak_hash::keccak(raw_tx).0))
        }

        async fn poll_by_identifier(&self, _tx_hash: &TxHash) -> Result<bool, LedgerError> {
            if self.fail_poll {
                return Err(LedgerError::Rpc { code: -32000, message: "boom".into() });
            }
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            Ok(*polls > self.pending_polls)
        }

        async fn balance_of(&self, _account: &Address) -> Result<u128, LedgerError> {
            Ok(0)
        }
    }

    fn settings() -> DisburserSettings {
        DisburserSettings {
            amount: 32_500_000_000_000_000_000,
            gas_limit: 40_000,
            gas_price: 1_000_000_000,
            chain_id: 5,
            poll_interval: Duration::from_secs(1),
            confirmation_timeout: Some(Duration::from_secs(300)),
        }
    }

    fn disburser(ledger: Arc<ScriptedLedger>, settings: DisburserSettings) -> (Disburser, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let key = signing_key_from_hex(KEY).unwrap();
        (Disburser::new(ledger, key, settings, rx), tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_waits_for_inclusion() {
        let ledger = Arc::new(ScriptedLedger {
            pending_polls: 3,
            ..Default::default()
        });
        let (disburser, _shutdown) = disburser(ledger.clone(), settings());
        let to = Address([0xab; 20]);

        let tx_hash = disburser.transfer_and_confirm(&to).await.unwrap();

        assert_eq!(*ledger.polls.lock().unwrap(), 4);
        let submitted = ledger.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(tx_hash, TxHash(keccak_hash::keccak(&submitted[0]).0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_transfers_use_increasing_nonces() {
        let ledger = Arc::new(ScriptedLedger::default());
        let (disburser, _shutdown) = disburser(ledger.clone(), settings());

        let first = disburser.transfer_and_confirm(&Address([1; 20])).await.unwrap();
        let second = disburser.transfer_and_confirm(&Address([2; 20])).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(*ledger.nonce.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_transfers_use_distinct_nonces() {
        let ledger = Arc::new(ScriptedLedger {
            yield_after_fetch: true,
            ..Default::default()
        });
        let (disburser, _shutdown) = disburser(ledger.clone(), settings());
        let disburser = Arc::new(disburser);

        let handles: Vec<_> = (1..=5u8)
            .map(|n| {
                let disburser = disburser.clone();
                tokio::spawn(async move { disburser.transfer_and_confirm(&Address([n; 20])).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut nonces: Vec<u64> = ledger
            .submitted
            .lock()
            .unwrap()
            .iter()
            .map(|raw| rlp::Rlp::new(raw).val_at(0).unwrap())
            .collect();
        nonces.sort_unstable();
        assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_nonce_failure_is_distinguishable() {
        let ledger = Arc::new(ScriptedLedger {
            fail_nonce: true,
            ..Default::default()
        });
        let (disburser, _shutdown) = disburser(ledger.clone(), settings());

        let err = disburser.transfer_and_confirm(&Address([1; 20])).await.unwrap_err();
        assert!(matches!(err, DisbursementError::SequenceFetch(_)));
        assert!(ledger.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_failure_aborts() {
        let ledger = Arc::new(ScriptedLedger {
            fail_poll: true,
            ..Default::default()
        });
        let (disburser, _shutdown) = disburser(ledger, settings());

        let err = disburser.transfer_and_confirm(&Address([1; 20])).await.unwrap_err();
        assert!(matches!(err, DisbursementError::Polling(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let ledger = Arc::new(ScriptedLedger {
            pending_polls: u32::MAX,
            ..Default::default()
        });
        let settings = DisburserSettings {
            confirmation_timeout: Some(Duration::from_secs(10)),
            ..settings()
        };
        let (disburser, _shutdown) = disburser(ledger, settings);

        let err = disburser.transfer_and_confirm(&Address([1; 20])).await.unwrap_err();
        assert!(matches!(err, DisbursementError::Timeout(d) if d == Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled_by_shutdown() {
        let ledger = Arc::new(ScriptedLedger {
            pending_polls: u32::MAX,
            ..Default::default()
        });
        let settings = DisburserSettings {
            confirmation_timeout: None,
            ..settings()
        };
        let (disburser, shutdown) = disburser(ledger, settings);

        let wait = disburser.transfer_and_confirm(&Address([1; 20]));
        let trigger = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            shutdown.send(true).unwrap();
        };
        let (result, _) = tokio::join!(wait, trigger);

        assert!(matches!(result, Err(DisbursementError::Cancelled)));
    }
}
