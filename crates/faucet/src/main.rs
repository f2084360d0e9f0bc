//! Faucet service binary

mod cli;

use anyhow::Context;
use clap::Parser;
use drip_common::utils::config::load_config;
use drip_common::utils::converter::format_units;
use drip_common::utils::logging::init_logging;
use drip_faucet::config::ENV_PREFIX;
use drip_faucet::transaction::signing_key_from_hex;
use drip_faucet::{
    api, spawn_limit_decay, Disburser, DisburserSettings, FaucetConfig, FaucetService, InMemoryAdmission,
    JsonRpcLedgerClient, LedgerClient, RecaptchaClient, VerificationPolicy,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Load configuration: file, then FAUCET_* env, then flags
    let mut config: FaucetConfig = load_config(args.config.as_ref(), ENV_PREFIX)?;
    args.apply(&mut config);

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("could not initialize logging: {}", e))?;
    config.validate().context("invalid configuration")?;

    info!("Starting drip faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("  HTTP address: {}", config.http_addr);
    info!("  Web3 provider: {}", config.web3_provider);
    info!("  Chain id: {}", config.chain_id);
    info!("  Funding amount: {} wei", config.funding_amount);
    info!("  IP limit per address: {}", config.ip_limit_per_address);

    let signing_key = signing_key_from_hex(&config.private_key).context("could not parse funder private key")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ledger: Arc<dyn LedgerClient> = Arc::new(JsonRpcLedgerClient::new(config.web3_provider.clone()));
    let disburser = Arc::new(Disburser::new(
        ledger.clone(),
        signing_key,
        DisburserSettings {
            amount: config.funding_amount_wei()?,
            gas_limit: config.gas_limit,
            gas_price: config.gas_price_wei()?,
            chain_id: config.chain_id,
            poll_interval: config.confirmation_poll_interval(),
            confirmation_timeout: config.confirmation_timeout(),
        },
        shutdown_rx.clone(),
    ));

    let funder = disburser.funder();
    match ledger.balance_of(&funder).await {
        Ok(balance) => info!(
            funds_in_wei = %balance,
            funds = %format_units(balance, config.decimals),
            public_key = %funder,
            "Funder details"
        ),
        Err(e) => warn!(error = %e, public_key = %funder, "Could not retrieve funder's current balance"),
    }

    let admission = Arc::new(InMemoryAdmission::new(config.ip_limit_per_address));
    let verifier = Arc::new(RecaptchaClient::new(
        config.captcha_verify_url.clone(),
        config.captcha_secret.clone(),
    ));
    let policy = VerificationPolicy {
        min_score: config.captcha_min_score,
        expected_hostname_suffix: config.captcha_host.clone(),
        max_age: config.captcha_max_age(),
    };
    let service = Arc::new(
        FaucetService::new(verifier, policy, admission.clone(), disburser, config.decimals)
            .with_claims(config.claim_before_disburse),
    );

    // Check IP addresses and reset their max request count over time
    let decay_handle = spawn_limit_decay(admission, config.limit_refresh_interval(), shutdown_rx);

    let app = api::router(service, &config.allowed_origins);

    let addr: SocketAddr = config.http_addr.parse().context("invalid http address")?;
    info!("Serving REST http requests on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    decay_handle.await?;
    info!("Shutting down gracefully");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM and tell background work to stop.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    let _ = shutdown_tx.send(true);
}
