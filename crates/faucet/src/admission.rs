//! Per-IP / per-destination admission control.
//!
//! A destination is granted at most once per process lifetime. Each source
//! IP may collect `limit` grants before it is refused; its counter is
//! decremented by one on every decay tick. State lives in memory only and
//! is lost on restart.

use crate::error::AdmissionDenial;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Admission policy consulted before, and updated after, each grant.
#[async_trait]
pub trait AdmissionController: Send + Sync {
    /// Whether `destination` may be funded on behalf of `source`. Read-only.
    async fn allow(&self, source: &str, destination: &str) -> Result<(), AdmissionDenial>;

    /// Record a confirmed grant. Only call after a passed `allow`.
    async fn record(&self, source: &str, destination: &str);

    /// One decay tick: every positive per-source counter drops by one.
    async fn decay(&self);

    /// Reserve `destination` for an in-flight grant. Fails if it is already
    /// granted or reserved.
    async fn try_claim(&self, destination: &str) -> Result<(), AdmissionDenial>;

    /// Drop a reservation taken by `try_claim` without granting.
    async fn release(&self, destination: &str);
}

#[derive(Debug, Default)]
struct AdmissionState {
    granted: HashSet<String>,
    claimed: HashSet<String>,
    /// Missing key means zero; decay removes counters as they reach zero.
    ip_counter: HashMap<String, u32>,
}

/// Default in-memory admission controller.
#[derive(Debug)]
pub struct InMemoryAdmission {
    limit: u32,
    state: RwLock<AdmissionState>,
}

impl InMemoryAdmission {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            state: RwLock::new(AdmissionState::default()),
        }
    }

    /// Grants attributed to `source` since the counter last decayed to zero.
    pub async fn count(&self, source: &str) -> u32 {
        self.state.read().await.ip_counter.get(source).copied().unwrap_or(0)
    }

    /// Number of sources with a non-zero counter.
    pub async fn tracked_sources(&self) -> usize {
        self.state.read().await.ip_counter.len()
    }
}

#[async_trait]
impl AdmissionController for InMemoryAdmission {
    async fn allow(&self, source: &str, destination: &str) -> Result<(), AdmissionDenial> {
        let (count, funded) = {
            let state = self.state.read().await;
            (
                state.ip_counter.get(source).copied().unwrap_or(0),
                state.granted.contains(destination),
            )
        };

        if count >= self.limit {
            warn!(ip_address = %source, count, limit = self.limit, "IP trying to get funding despite over request limit");
        }
        if funded {
            return Err(AdmissionDenial::AlreadyGranted);
        }
        if count >= self.limit {
            return Err(AdmissionDenial::IdentityLimitReached {
                count,
                limit: self.limit,
            });
        }
        Ok(())
    }

    async fn record(&self, source: &str, destination: &str) {
        let mut state = self.state.write().await;
        *state.ip_counter.entry(source.to_string()).or_insert(0) += 1;
        state.claimed.remove(destination);
        state.granted.insert(destination.to_string());
    }

    async fn decay(&self) {
        let mut state = self.state.write().await;
        info!(num_ips = state.ip_counter.len(), "Decreasing requests counter for all recorded IP addresses");
        state.ip_counter.retain(|_, counter| {
            *counter = counter.saturating_sub(1);
            *counter > 0
        });
    }

    async fn try_claim(&self, destination: &str) -> Result<(), AdmissionDenial> {
        let mut state = self.state.write().await;
        if state.granted.contains(destination) || !state.claimed.insert(destination.to_string()) {
            return Err(AdmissionDenial::AlreadyGranted);
        }
        Ok(())
    }

    async fn release(&self, destination: &str) {
        self.state.write().await.claimed.remove(destination);
    }
}
