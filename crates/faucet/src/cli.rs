use clap::Parser;
use drip_faucet::FaucetConfig;
use std::path::PathBuf;

/// Run a faucet server for Ethereum using captcha
#[derive(Parser, Debug)]
#[command(name = "drip", author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (TOML, YAML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to serve REST http requests on
    #[arg(long)]
    pub http_addr: Option<String>,

    /// Allowed origins for REST http requests, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub allowed_origins: Option<Vec<String>>,

    /// Host for the captcha validation
    #[arg(long)]
    pub captcha_host: Option<String>,

    /// Secret for captcha validation
    #[arg(long)]
    pub captcha_secret: Option<String>,

    /// Minimum passing captcha score
    #[arg(long)]
    pub captcha_min_score: Option<f64>,

    /// HTTP web3provider endpoint to an Ethereum node
    #[arg(long)]
    pub web3_provider: Option<String>,

    /// Private key hex string of the funder of the faucet
    #[arg(long)]
    pub private_key: Option<String>,

    /// Amount to send per grant (in wei)
    #[arg(long)]
    pub funding_amount: Option<String>,

    /// Gas limit for grant transactions
    #[arg(long)]
    pub gas_limit: Option<u64>,

    /// Chain id to sign transactions for
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Grants allowed per IP before it is rate limited
    #[arg(long)]
    pub ip_limit_per_address: Option<u32>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Override config values with the flags that were given.
    pub fn apply(self, config: &mut FaucetConfig) {
        if let Some(addr) = self.http_addr {
            config.http_addr = addr;
        }
        if let Some(origins) = self.allowed_origins {
            config.allowed_origins = origins;
        }
        if let Some(host) = self.captcha_host {
            config.captcha_host = host;
        }
        if let Some(secret) = self.captcha_secret {
            config.captcha_secret = secret;
        }
        if let Some(score) = self.captcha_min_score {
            config.captcha_min_score = score;
        }
        if let Some(provider) = self.web3_provider {
            config.web3_provider = provider;
        }
        if let Some(key) = self.private_key {
            config.private_key = key;
        }
        if let Some(amount) = self.funding_amount {
            config.funding_amount = amount;
        }
        if let Some(gas_limit) = self.gas_limit {
            config.gas_limit = gas_limit;
        }
        if let Some(chain_id) = self.chain_id {
            config.chain_id = chain_id;
        }
        if let Some(limit) = self.ip_limit_per_address {
            config.ip_limit_per_address = limit;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "drip",
            "--captcha-host",
            "faucet.example.org",
            "--allowed-origins",
            "https://a.example,https://b.example",
            "--chain-id",
            "11155111",
            "--debug",
        ]);
        let mut config = FaucetConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.captcha_host, "faucet.example.org");
        assert_eq!(config.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.chain_id, 11155111);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.gas_limit, 40_000);
    }
}
