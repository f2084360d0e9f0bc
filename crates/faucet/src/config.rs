//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use drip_common::utils::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix, e.g. `FAUCET_PRIVATE_KEY`.
pub const ENV_PREFIX: &str = "FAUCET";

pub const DEFAULT_FUNDING_AMOUNT: &str = "32500000000000000000"; // 32.5 ETH
pub const DEFAULT_CAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// HTTP listen address
    pub http_addr: String,

    /// Allowed CORS origins, `*` for any
    pub allowed_origins: Vec<String>,

    /// Hostname suffix the captcha must have been solved on
    pub captcha_host: String,

    /// Captcha secret key
    pub captcha_secret: String,

    /// Minimum passing captcha score
    pub captcha_min_score: f64,

    /// Captcha verification endpoint
    pub captcha_verify_url: String,

    /// Oldest accepted captcha challenge (seconds)
    pub captcha_max_age_secs: u64,

    /// HTTP JSON-RPC endpoint of an Ethereum node
    pub web3_provider: String,

    /// Funder private key (hex, `0x` optional)
    pub private_key: String,

    /// Amount to grant per request (in wei)
    pub funding_amount: String,

    /// Gas limit for grant transactions
    pub gas_limit: u64,

    /// Gas price to use (in wei)
    pub gas_price: String,

    /// EIP-155 chain id the transfers are signed for
    pub chain_id: u64,

    /// Decimals of the native currency
    pub decimals: u32,

    /// Grants allowed per source IP before the limit trips
    pub ip_limit_per_address: u32,

    /// Interval between per-IP counter decrements (seconds)
    pub limit_refresh_interval_secs: u64,

    /// Transaction inclusion poll interval (milliseconds)
    pub confirmation_poll_interval_ms: u64,

    /// Give up waiting for inclusion after this long (seconds, 0 = wait forever)
    pub confirmation_timeout_secs: u64,

    /// Claim destinations before sending and release them on failure
    pub claim_before_disburse: bool,

    pub logging: LoggingConfig,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8000".to_string(),
            allowed_origins: vec!["*".to_string()],
            captcha_host: String::new(),
            captcha_secret: String::new(),
            captcha_min_score: 0.9,
            captcha_verify_url: DEFAULT_CAPTCHA_VERIFY_URL.to_string(),
            captcha_max_age_secs: 120,
            web3_provider: "http://localhost:8545".to_string(),
            private_key: String::new(),
            funding_amount: DEFAULT_FUNDING_AMOUNT.to_string(),
            gas_limit: 40_000,
            gas_price: "1000000000".to_string(), // 1 Gwei
            chain_id: 5,
            decimals: 18,
            ip_limit_per_address: 5,
            limit_refresh_interval_secs: 4 * 60 * 60,
            confirmation_poll_interval_ms: 1000,
            confirmation_timeout_secs: 300,
            claim_before_disburse: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl FaucetConfig {
    /// Check that everything the service needs is present and well formed.
    pub fn validate(&self) -> FaucetResult<()> {
        let required = [
            ("captcha-host", &self.captcha_host),
            ("captcha-secret", &self.captcha_secret),
            ("web3-provider", &self.web3_provider),
            ("private-key", &self.private_key),
        ];
        for (flag, value) in required {
            if value.trim().is_empty() {
                return Err(FaucetError::Config(format!("--{} required", flag)));
            }
        }

        self.funding_amount_wei()?;
        self.gas_price_wei()?;

        if self.ip_limit_per_address == 0 {
            return Err(FaucetError::Config("ip-limit-per-address must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.captcha_min_score) {
            return Err(FaucetError::Config(format!(
                "captcha-min-score must be within [0, 1], got {}",
                self.captcha_min_score
            )));
        }
        if self.limit_refresh_interval_secs == 0 || self.confirmation_poll_interval_ms == 0 {
            return Err(FaucetError::Config("intervals must be positive".to_string()));
        }

        Ok(())
    }

    pub fn funding_amount_wei(&self) -> FaucetResult<u128> {
        self.funding_amount
            .trim()
            .parse::<u128>()
            .map_err(|e| FaucetError::Config(format!("could not parse funding amount: {}", e)))
    }

    pub fn gas_price_wei(&self) -> FaucetResult<u128> {
        self.gas_price
            .trim()
            .parse::<u128>()
            .map_err(|e| FaucetError::Config(format!("could not parse gas price: {}", e)))
    }

    pub fn limit_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.limit_refresh_interval_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        match self.confirmation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn captcha_max_age(&self) -> Duration {
        Duration::from_secs(self.captcha_max_age_secs)
    }
}
