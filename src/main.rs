use std::sync::Arc;

use dotenv::dotenv;
use log::info;
use tokio::sync::watch;

use solana_whale_sampler::{
    dex::StakingLookup,
    whale::{TransactionRecorder, WalletStateManager, WhaleClassifier},
    AppConfig, Clock, LedgerSource, RateLimitedFetcher, RpcLedger, SamplingScheduler, SystemClock,
    WhaleDetector, WhaleStore,
};
use solana_whale_sampler::scheduler::shutdown_on;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let config = AppConfig::load_from_env()?;
    info!(
        "Starting Solana whale sampler against {} ({:?} rules)",
        config.solana.rpc_url, config.whale.rule_set
    );

    let ledger: Arc<dyn LedgerSource> = Arc::new(RpcLedger::new(
        &config.solana,
        config.fetch.max_supported_transaction_version,
    ));
    let store: Arc<dyn WhaleStore> = config
        .store
        .open(chrono::Duration::days(config.whale.long_term_days))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let detector = WhaleDetector::new(
        WhaleClassifier::new(
            config.whale.clone(),
            Arc::clone(&store),
            StakingLookup::new(Arc::clone(&ledger)),
            Arc::clone(&clock),
        ),
        WalletStateManager::new(Arc::clone(&store), Arc::clone(&clock)),
        TransactionRecorder::new(
            Arc::clone(&store),
            clock,
            config.recorder_retry.clone(),
            config.whale.amount_mode,
        ),
    );

    let mut scheduler = SamplingScheduler::new(
        RateLimitedFetcher::new(ledger, config.fetch.clone()),
        detector,
        store,
        config.whale.clone(),
        config.scheduler.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_on(tokio::signal::ctrl_c(), shutdown_tx));

    let cycles = scheduler.run(shutdown_rx).await;
    info!("Sampler exited after {} completed cycle(s)", cycles);
    Ok(())
}
