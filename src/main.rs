//! Marginly Liquidation Keeper
//!
//! Watches Marginly margin pools and liquidates positions above the pool's
//! max leverage, through a keeper contract flash loan or a pool `reinit`.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keeper_chain::gas::create_gas_strategy;
use keeper_chain::{
    PoolStateReader, ProviderManager, RpcPoolReader, RpcStrategyExecutor, TransactionSenderBuilder,
};
use keeper_core::{
    stop_channel, Keeper, KeeperConfig, KeeperSettings, LiquidationDispatcher, RiskScanner,
    StopHandle,
};

/// Environment variable names.
mod env {
    pub const ETH_NODE_URI: &str = "ETH_NODE_URI";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const KEEPER_CONFIG: &str = "KEEPER_CONFIG";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

const DEFAULT_LOG_FILTER: &str = "info,keeper_core=debug,keeper_chain=debug";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting Marginly liquidation keeper");

    let settings = KeeperSettings::from_env().context("loading keeper settings")?;
    settings.log_settings();

    let config_path =
        std::env::var(env::KEEPER_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = KeeperConfig::from_file(&config_path)
        .with_context(|| format!("loading pool config from {config_path}"))?;
    config.validate().context("validating pool config")?;

    let keeper = build_keeper(&config, &settings).await?;

    let (handle, token) = stop_channel();
    spawn_signal_listener(handle);

    let passes = keeper.run(token).await;
    info!(passes, "Shutdown complete");
    Ok(())
}

fn init_tracing() {
    let json = std::env::var(env::LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn get_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing env var: {name}"))
}

async fn build_keeper(config: &KeeperConfig, settings: &KeeperSettings) -> Result<Keeper> {
    info!("Initializing components...");

    let node_uri = get_env(env::ETH_NODE_URI)?;
    let provider = Arc::new(
        ProviderManager::new(&node_uri)
            .await
            .context("connecting to node")?,
    );

    let chain_id = provider.chain_id().await.context("reading chain id")?;
    if let Some(expected) = config.connection.chain_id {
        if expected != chain_id {
            bail!("node is on chain {chain_id}, config expects {expected}");
        }
    }
    info!(chain_id, "Provider initialized");

    let eth = &config.connection.eth_options;
    let gas_strategy = create_gas_strategy(
        &eth.pricing,
        eth.gas_price,
        eth.max_gas_price,
        eth.priority_fee,
    );
    let mut sender_builder =
        TransactionSenderBuilder::new(provider.clone()).gas_strategy(gas_strategy);
    if let Some(limit) = eth.gas_limit {
        sender_builder = sender_builder.gas_limit(limit);
    }
    let sender = Arc::new(
        sender_builder
            .build(&get_env(env::PRIVATE_KEY)?)
            .await
            .context("initializing transaction sender")?,
    );

    let balance = provider
        .native_balance(sender.address())
        .await
        .context("reading keeper balance")?;
    if balance.is_zero() {
        warn!(address = %sender.address(), "Keeper account has no native balance for gas");
    }
    info!(
        address = %sender.address(),
        balance = %balance,
        gas_strategy = sender.gas_strategy_name(),
        "Transaction sender initialized"
    );

    let reader: Arc<dyn PoolStateReader> = Arc::new(RpcPoolReader::new(provider.clone()));
    let pools = config
        .resolve_pools(reader.as_ref())
        .await
        .context("resolving pools")?;
    if pools.is_empty() {
        warn!("No marginlyPools configured, the keeper will idle");
    }

    let keepers = config.keepers.resolve().context("parsing keeper addresses")?;
    let executor = Arc::new(RpcStrategyExecutor::new(provider, sender, keepers));

    let scanner = RiskScanner::new(reader, settings.read_retry.policy());
    let dispatcher = LiquidationDispatcher::new(executor, settings.submit_retry.policy());

    info!(pools = pools.len(), "All components initialized");
    Ok(Keeper::new(scanner, dispatcher, pools, settings.keeper.interval()))
}

/// Stop the keeper on Ctrl-C or SIGTERM.
fn spawn_signal_listener(handle: StopHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sig_term) => {
                    tokio::select! {
                        _ = sig_term.recv() => warn!("Received terminate"),
                        _ = tokio::signal::ctrl_c() => warn!("Received CTRL+C"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Cannot listen for SIGTERM, Ctrl-C only");
                    let _ = tokio::signal::ctrl_c().await;
                    warn!("Received CTRL+C");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            warn!("Received CTRL+C");
        }

        info!("Stopping after in-flight work");
        handle.stop();
    });
}
