use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;

use crate::config::{env_or, ConfigError};
use crate::ledger::{FetchOutcome, RateLimitedFetcher};
use crate::store::WhaleStore;
use crate::whale::detector::{DetectionReport, WhaleDetector};
use crate::whale::report;
use crate::whale::WhaleConfig;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub blocks_per_sample: usize,
    pub block_delay: Duration,
    pub cooldown: Duration,
    /// Cycles between detailed whale reports; 0 disables them.
    pub report_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            blocks_per_sample: 10,
            block_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(300),
            report_every: 12,
        }
    }
}

impl SchedulerConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            blocks_per_sample: env_or("SAMPLER_BLOCKS_PER_SAMPLE", defaults.blocks_per_sample)?.max(1),
            block_delay: Duration::from_millis(env_or(
                "SAMPLER_BLOCK_DELAY_MS",
                defaults.block_delay.as_millis() as u64,
            )?),
            cooldown: Duration::from_secs(env_or("SAMPLER_COOLDOWN_SECS", defaults.cooldown.as_secs())?),
            report_every: env_or("SAMPLER_REPORT_EVERY", defaults.report_every)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    Fetching(usize),
    /// Waiting before fetching the given block index.
    Pacing(usize),
    Cooldown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub blocks_processed: u64,
    pub empty_blocks: u64,
    pub abandoned_slots: u64,
    pub detection: DetectionReport,
}

/// Drives fetch → detect for a fixed number of blocks per cycle, pacing
/// between blocks and cooling down between cycles, until shut down.
pub struct SamplingScheduler {
    fetcher: RateLimitedFetcher,
    detector: WhaleDetector,
    store: Arc<dyn WhaleStore>,
    whale_config: WhaleConfig,
    config: SchedulerConfig,
    cycles_completed: u64,
}

impl SamplingScheduler {
    pub fn new(
        fetcher: RateLimitedFetcher,
        detector: WhaleDetector,
        store: Arc<dyn WhaleStore>,
        whale_config: WhaleConfig,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            fetcher,
            detector,
            store,
            whale_config,
            config,
            cycles_completed: 0,
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped) and return
    /// the number of completed cycles. The flag is checked between steps and
    /// interrupts any sleep.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            "Starting continuous monitoring: {} blocks per sample, {:?} between blocks, {:?} cooldown",
            self.config.blocks_per_sample, self.config.block_delay, self.config.cooldown
        );

        let mut state = SamplerState::Fetching(0);
        let mut current = CycleReport::default();

        while !*shutdown.borrow() {
            match self.step(state, &mut current, &mut shutdown).await {
                Some(next) => state = next,
                None => break,
            }
        }

        info!("Sampler stopped after {} completed cycle(s)", self.cycles_completed);
        self.cycles_completed
    }

    // None when shutdown interrupted a sleep.
    async fn step(
        &mut self,
        state: SamplerState,
        current: &mut CycleReport,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<SamplerState> {
        match state {
            SamplerState::Fetching(index) => {
                self.fetch_and_process(current).await;
                Some(self.after_fetch(index))
            }
            SamplerState::Pacing(next) => sleep_or_shutdown(self.config.block_delay, shutdown)
                .await
                .then_some(SamplerState::Fetching(next)),
            SamplerState::Cooldown => {
                self.finish_cycle(std::mem::take(current)).await;
                sleep_or_shutdown(self.config.cooldown, shutdown)
                    .await
                    .then_some(SamplerState::Fetching(0))
            }
        }
    }

    fn after_fetch(&self, index: usize) -> SamplerState {
        if index + 1 >= self.config.blocks_per_sample {
            SamplerState::Cooldown
        } else {
            SamplerState::Pacing(index + 1)
        }
    }

    async fn fetch_and_process(&self, current: &mut CycleReport) {
        match self.fetcher.fetch_next_block().await {
            FetchOutcome::Block(block) => {
                let detection = self.detector.process_block(&block).await;
                current.detection.merge(&detection);
                current.blocks_processed += 1;
            }
            FetchOutcome::Empty { .. } => current.empty_blocks += 1,
            FetchOutcome::Abandoned { slot, error } => {
                warn!("Abandoned slot {:?}: {}", slot, error);
                current.abandoned_slots += 1;
            }
        }
    }

    async fn finish_cycle(&mut self, mut current: CycleReport) {
        self.cycles_completed += 1;
        current.cycle = self.cycles_completed;

        info!(
            "Cycle {} complete. Detected {} new whale wallets in this cycle ({} blocks, {} empty, {} abandoned, {} transactions recorded).",
            current.cycle,
            current.detection.new_whales,
            current.blocks_processed,
            current.empty_blocks,
            current.abandoned_slots,
            current.detection.recorded
        );

        if let Err(e) = report::log_stats(self.store.as_ref()).await {
            warn!("Unable to read store stats: {}", e);
        }
        if self.config.report_every > 0 && current.cycle % self.config.report_every == 0 {
            report::log_detailed_report(self.store.as_ref(), &self.whale_config).await;
        }
    }
}

/// Flip `shutdown` once `signal` fires. If the signal cannot be listened for,
/// the sender is kept alive so only external termination stops the sampler.
pub async fn shutdown_on<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Shutdown requested, finishing current step");
            let _ = shutdown.send(true);
        }
        Err(e) => {
            error!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// False when shutdown was requested before the delay elapsed.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow(),
            Err(_) => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::dex::StakingLookup;
    use crate::ledger::{FetchConfig, LedgerBlock, LedgerError, LedgerSource, LedgerTransaction, MockLedgerSource};
    use crate::retry::RetryConfig;
    use crate::store::MemoryStore;
    use crate::whale::{RuleSet, TransactionRecorder, WalletStateManager, WhaleClassifier};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    const SOL: u64 = 1_000_000_000;

    fn whale_block(slot: u64) -> LedgerBlock {
        LedgerBlock {
            slot,
            block_time: None,
            transactions: vec![LedgerTransaction {
                signature: Some(format!("sig-{}", slot)),
                account_keys: vec![format!("WHALE-{}", slot), "OTHER".to_string()],
                pre_balances: Some(vec![50_000 * SOL, 0]),
                post_balances: Some(vec![50_000 * SOL, 0]),
                ..LedgerTransaction::default()
            }],
        }
    }

    fn scheduler(ledger: MockLedgerSource, store: Arc<MemoryStore>, config: SchedulerConfig) -> SamplingScheduler {
        let ledger: Arc<dyn LedgerSource> = Arc::new(ledger);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        let whale_config = WhaleConfig::default().with_rule_set(RuleSet::Balance);

        let detector = WhaleDetector::new(
            WhaleClassifier::new(
                whale_config.clone(),
                store.clone(),
                StakingLookup::new(Arc::clone(&ledger)),
                clock.clone(),
            ),
            WalletStateManager::new(store.clone(), clock.clone()),
            TransactionRecorder::new(store.clone(), clock, RetryConfig::default(), whale_config.amount_mode),
        );

        SamplingScheduler::new(
            RateLimitedFetcher::new(ledger, FetchConfig::default()),
            detector,
            store,
            whale_config,
            config,
        )
    }

    fn counting_ledger() -> MockLedgerSource {
        let next_slot = Arc::new(AtomicU64::new(100));
        let mut ledger = MockLedgerSource::new();
        ledger
            .expect_get_slot()
            .returning(move || Ok(next_slot.fetch_add(1, Ordering::SeqCst)));
        ledger.expect_get_block().returning(|slot| Ok(Some(whale_block(slot))));
        ledger
    }

    // Run the scheduler and request shutdown once `after` has elapsed.
    async fn run_for(mut scheduler: SamplingScheduler, after: Duration) -> u64 {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stop = async move {
            tokio::time::sleep(after).await;
            shutdown_tx.send(true).unwrap();
        };
        let (cycles, ()) = tokio::join!(scheduler.run(shutdown_rx), stop);
        cycles
    }

    #[tokio::test(start_paused = true)]
    async fn paces_between_blocks_of_a_cycle() {
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            blocks_per_sample: 3,
            ..SchedulerConfig::default()
        };
        // Blocks go out at 0s, 1s and 2s
        let scheduler = scheduler(counting_ledger(), store.clone(), config);
        let cycles = run_for(scheduler, Duration::from_millis(1_500)).await;
        assert_eq!(cycles, 0);
        assert_eq!(store.stats().await.unwrap().wallets, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_completes_before_cooldown() {
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            blocks_per_sample: 3,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler(counting_ledger(), store.clone(), config);
        let cycles = run_for(scheduler, Duration::from_secs(10)).await;
        assert_eq!(cycles, 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.wallets, 3);
        assert_eq!(stats.transactions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_slots_do_not_stop_the_cycle() {
        let mut ledger = MockLedgerSource::new();
        ledger.expect_get_slot().returning(|| Ok(1));
        ledger
            .expect_get_block()
            .times(6)
            .returning(|_| Err(LedgerError::Transient("gateway timeout".into())));

        let config = SchedulerConfig {
            blocks_per_sample: 2,
            ..SchedulerConfig::default()
        };
        // Each slot burns 20s of retries, so the cycle ends at 41s
        let scheduler = scheduler(ledger, Arc::new(MemoryStore::new()), config);
        let cycles = run_for(scheduler, Duration::from_secs(100)).await;
        assert_eq!(cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loops_through_cooldown_until_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let config = SchedulerConfig {
            blocks_per_sample: 2,
            block_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(60),
            report_every: 1,
        };
        // Second cycle ends at 62s, shutdown lands during its cooldown
        let scheduler = scheduler(counting_ledger(), store.clone(), config);
        let cycles = run_for(scheduler, Duration::from_secs(100)).await;
        assert_eq!(cycles, 2);
        assert_eq!(store.stats().await.unwrap().wallets, 4);
    }

    #[tokio::test]
    async fn already_shut_down_does_nothing() {
        let mut ledger = MockLedgerSource::new();
        ledger.expect_get_slot().never();

        let mut scheduler = scheduler(ledger, Arc::new(MemoryStore::new()), SchedulerConfig::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        assert_eq!(scheduler.run(shutdown_rx).await, 0);
    }

    #[tokio::test]
    async fn signal_flips_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_on(async { Ok(()) }, shutdown_tx).await;
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_signal_handler_keeps_running() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(shutdown_on(
            async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler")) },
            shutdown_tx,
        ));

        tokio::time::sleep(Duration::from_secs(3_600)).await;

        assert!(!*shutdown_rx.borrow());
        // The sender is still alive, so the sampler is never told to stop
        assert!(matches!(shutdown_rx.has_changed(), Ok(false)));
        assert!(!listener.is_finished());

        listener.abort();
        assert!(shutdown_rx.changed().await.is_err());
    }
}
