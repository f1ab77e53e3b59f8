use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use withdrawal_coordinator::api::{admin_routes, create_router};
use withdrawal_coordinator::config::{load_config, AppConfig};
use withdrawal_coordinator::db::{connect_store, WithdrawalStore};
use withdrawal_coordinator::lock::{LockSweeper, WithdrawalLockManager};
use withdrawal_coordinator::notify::TelegramNotifier;
use withdrawal_coordinator::payout::{
    ExchangePayoutExecutor, PayoutExecutor, PayoutRouter, WalletPayoutExecutor,
};
use withdrawal_coordinator::processor::WithdrawalProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("Withdrawal Coordinator")
        .version("0.1.0")
        .about("Coordinates admin processing of withdrawal requests")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Path to configuration file")
                .default_value("config.toml")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .get_matches();

    let config_path = matches.get_one::<PathBuf>("config");
    let config = load_config(config_path.map(PathBuf::as_path))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting withdrawal coordinator");

    let store: Arc<dyn WithdrawalStore> = Arc::new(connect_store(&config.database).await?);
    let manager = Arc::new(WithdrawalLockManager::new(store.clone(), &config.lock));

    let sweeper = LockSweeper::new(manager.clone(), &config.lock).spawn();
    info!(
        "Lock sweeper started (timeout {}s, every {}s)",
        manager.timeout().as_secs(),
        config.lock.cleanup_interval_secs
    );

    let processor = build_processor(&config, manager.clone(), store)?;
    info!(
        "Withdrawal processor ready (max {} payout attempts)",
        config.processor.max_attempts
    );
    let app = create_router(manager).merge(admin_routes(Arc::new(processor)));
    let listener = TcpListener::bind(&config.server.host).await?;
    info!("Ops API listening on {}", listener.local_addr()?);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Ops API stopped with error: {:?}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down withdrawal coordinator");

    sweeper.abort();
    server.abort();

    Ok(())
}

fn build_processor(
    config: &AppConfig,
    manager: Arc<WithdrawalLockManager>,
    store: Arc<dyn WithdrawalStore>,
) -> anyhow::Result<WithdrawalProcessor> {
    let exchange: Arc<dyn PayoutExecutor> =
        Arc::new(ExchangePayoutExecutor::from_config(&config.exchange));

    let wallet_configured =
        !config.wallet.token_contract.is_empty() && !config.wallet.from_address.is_empty();
    let wallet: Option<Arc<dyn PayoutExecutor>> = if wallet_configured {
        let rpc_url = Url::parse(&config.wallet.get_rpc_url())?;
        let executor: Arc<dyn PayoutExecutor> =
            Arc::new(WalletPayoutExecutor::new(rpc_url, &config.wallet)?);
        Some(executor)
    } else {
        warn!("BEP20 wallet not configured, on-chain payouts disabled");
        None
    };

    let router = PayoutRouter::new(exchange, wallet, config.wallet.bep20_networks.clone());
    let notifier = TelegramNotifier::from_config(&config.telegram);

    Ok(WithdrawalProcessor::new(
        manager,
        store,
        Arc::new(router),
        Arc::new(notifier),
        config.processor.max_attempts,
    ))
}
