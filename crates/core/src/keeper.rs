//! Keeper loop.
//!
//! Scans every configured pool in order and dispatches each breach before
//! moving on, then sleeps for the configured interval. A [`StopToken`]
//! ends the loop between pools, between candidates, or during the sleep.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::PoolConfig;
use crate::dispatcher::LiquidationDispatcher;
use crate::risk::{RiskScanner, ScanOutcome};

/// Create a linked stop handle and token.
pub fn stop_channel() -> (StopHandle, StopToken) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopToken { rx })
}

/// Requests shutdown. Dropping it also stops every token.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes a shutdown request.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once a stop is requested.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Counters for one pass over all pools.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub pools_scanned: usize,
    pub scan_failures: usize,
    pub emergencies: usize,
    pub breaches: usize,
    pub liquidated: usize,
    pub failed: usize,
}

pub struct Keeper {
    scanner: RiskScanner,
    dispatcher: LiquidationDispatcher,
    pools: Vec<PoolConfig>,
    interval: Duration,
}

impl Keeper {
    pub fn new(
        scanner: RiskScanner,
        dispatcher: LiquidationDispatcher,
        pools: Vec<PoolConfig>,
        interval: Duration,
    ) -> Self {
        Self {
            scanner,
            dispatcher,
            pools,
            interval,
        }
    }

    /// Run passes until `stop` fires. Returns the number of passes run.
    pub async fn run(&self, mut stop: StopToken) -> u64 {
        info!(
            pools = self.pools.len(),
            interval_secs = self.interval.as_secs(),
            "Keeper started"
        );

        let mut passes = 0u64;
        while !stop.is_stopped() {
            let started = Instant::now();
            let summary = self.run_pass(&stop).await;
            passes += 1;

            info!(
                pass = passes,
                pools_scanned = summary.pools_scanned,
                scan_failures = summary.scan_failures,
                emergencies = summary.emergencies,
                breaches = summary.breaches,
                liquidated = summary.liquidated,
                failed = summary.failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Pass complete"
            );

            tokio::select! {
                _ = stop.stopped() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(passes, "Keeper stopped");
        passes
    }

    /// One sequential pass over every pool.
    pub async fn run_pass(&self, stop: &StopToken) -> PassSummary {
        let mut summary = PassSummary::default();

        for pool in &self.pools {
            if stop.is_stopped() {
                break;
            }
            summary.pools_scanned += 1;

            let outcome = match self.scanner.scan(pool).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(pool = %pool.address, error = %e, "Scan failed, skipping pool");
                    summary.scan_failures += 1;
                    continue;
                }
            };

            if let ScanOutcome::Emergency(_) = outcome {
                summary.emergencies += 1;
                continue;
            }

            for params in outcome.candidates() {
                if stop.is_stopped() {
                    break;
                }
                summary.breaches += 1;
                // dispatcher logs every failure itself
                match self.dispatcher.dispatch(pool, params).await {
                    Ok(_) => summary.liquidated += 1,
                    Err(_) => summary.failed += 1,
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::{fast_retry, Call, RecordingExecutor};
    use crate::risk::tests::{long_position, pool_config, short_position, snapshot, MockReader, POOL};
    use alloy::primitives::Address;
    use async_trait::async_trait;
    use alloy::primitives::U256;
    use keeper_chain::{
        AaveCall, BalancerCall, ChainReadError, ExecutionError, FlashSwapCall, FlashSwapDex,
        HeapHead, Mode, PoolSnapshot, PoolStateReader, Position, StrategyExecutor, TxSummary,
    };
    use std::sync::Arc;

    const BROKEN_POOL: Address = Address::repeat_byte(0x66);

    /// Fails every read for [`BROKEN_POOL`], delegates the rest.
    struct PartiallyBroken(MockReader);

    #[async_trait]
    impl PoolStateReader for PartiallyBroken {
        async fn read_pool_snapshot(&self, pool: Address) -> Result<PoolSnapshot, ChainReadError> {
            if pool == BROKEN_POOL {
                return Err(ChainReadError::malformed("mode", "pool self-destructed"));
            }
            self.0.read_pool_snapshot(pool).await
        }

        async fn read_position(
            &self,
            pool: Address,
            account: Address,
        ) -> Result<Position, ChainReadError> {
            self.0.read_position(pool, account).await
        }

        async fn read_heap_head(
            &self,
            pool: Address,
            short: bool,
        ) -> Result<Option<HeapHead>, ChainReadError> {
            self.0.read_heap_head(pool, short).await
        }

        async fn token_decimals(&self, token: Address) -> Result<u8, ChainReadError> {
            self.0.token_decimals(token).await
        }
    }

    /// Requests a stop from inside the first `reinit`.
    struct StopOnReinit {
        inner: RecordingExecutor,
        handle: StopHandle,
    }

    #[async_trait]
    impl StrategyExecutor for StopOnReinit {
        fn liquidator(&self) -> Address {
            self.inner.liquidator()
        }

        async fn is_borrowable(&self, asset: Address) -> Result<bool, ExecutionError> {
            self.inner.is_borrowable(asset).await
        }

        async fn pool_tokens(&self, pool: Address) -> Result<(Address, Address), ExecutionError> {
            self.inner.pool_tokens(pool).await
        }

        async fn token_balance(&self, token: Address) -> Result<U256, ExecutionError> {
            self.inner.token_balance(token).await
        }

        async fn native_balance(&self) -> Result<U256, ExecutionError> {
            self.inner.native_balance().await
        }

        async fn reinit(&self, pool: Address) -> Result<TxSummary, ExecutionError> {
            self.handle.stop();
            self.inner.reinit(pool).await
        }

        async fn aave_liquidate(&self, call: &AaveCall) -> Result<TxSummary, ExecutionError> {
            self.inner.aave_liquidate(call).await
        }

        async fn flash_swap_liquidate(
            &self,
            dex: FlashSwapDex,
            call: &FlashSwapCall,
        ) -> Result<TxSummary, ExecutionError> {
            self.inner.flash_swap_liquidate(dex, call).await
        }

        async fn balancer_liquidate(&self, call: &BalancerCall) -> Result<TxSummary, ExecutionError> {
            self.inner.balancer_liquidate(call).await
        }
    }

    fn keeper(
        reader: impl PoolStateReader + 'static,
        executor: Arc<dyn StrategyExecutor>,
        pools: Vec<PoolConfig>,
        interval: Duration,
    ) -> Keeper {
        Keeper::new(
            RiskScanner::new(Arc::new(reader), fast_retry()),
            LiquidationDispatcher::new(executor, fast_retry()),
            pools,
            interval,
        )
    }

    fn breached_reader() -> MockReader {
        let mut reader = MockReader::new(snapshot());
        reader.short = Some(short_position(1_000, 2_100));
        reader
    }

    #[tokio::test]
    async fn test_pass_dispatches_breaches() {
        let mut reader = breached_reader();
        reader.long = Some(long_position(100, 99));
        let executor = Arc::new(RecordingExecutor::default());
        let keeper = keeper(reader, executor.clone(), vec![pool_config()], Duration::ZERO);

        let (_handle, token) = stop_channel();
        let summary = keeper.run_pass(&token).await;

        assert_eq!(summary.breaches, 2);
        assert_eq!(summary.liquidated, 2);
        assert_eq!(executor.calls(), vec![Call::Reinit(POOL), Call::Reinit(POOL)]);
    }

    #[tokio::test]
    async fn test_scan_failure_skips_only_that_pool() {
        let executor = Arc::new(RecordingExecutor::default());
        let broken = PoolConfig {
            address: BROKEN_POOL,
            ..pool_config()
        };
        let keeper = keeper(
            PartiallyBroken(breached_reader()),
            executor.clone(),
            vec![broken, pool_config()],
            Duration::ZERO,
        );

        let (_handle, token) = stop_channel();
        let summary = keeper.run_pass(&token).await;

        assert_eq!(summary.pools_scanned, 2);
        assert_eq!(summary.scan_failures, 1);
        assert_eq!(executor.calls(), vec![Call::Reinit(POOL)]);
    }

    #[tokio::test]
    async fn test_emergency_pool_not_dispatched() {
        let mut snap = snapshot();
        snap.mode = Mode::LongEmergency;
        let mut reader = MockReader::new(snap);
        reader.short = Some(short_position(1_000, 2_100));
        let executor = Arc::new(RecordingExecutor::default());
        let keeper = keeper(reader, executor.clone(), vec![pool_config()], Duration::ZERO);

        let (_handle, token) = stop_channel();
        let summary = keeper.run_pass(&token).await;

        assert_eq!(summary.emergencies, 1);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_abort_pass() {
        let executor = Arc::new(RecordingExecutor {
            revert_liquidations: true,
            ..Default::default()
        });
        let mut balancer = pool_config();
        balancer.strategy = crate::config::Strategy::Balancer;
        let keeper = keeper(
            breached_reader(),
            executor.clone(),
            vec![balancer, pool_config()],
            Duration::ZERO,
        );

        let (_handle, token) = stop_channel();
        let summary = keeper.run_pass(&token).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.liquidated, 1);
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_candidates_after_stop_not_counted() {
        let mut reader = breached_reader();
        reader.long = Some(long_position(100, 99));
        let (handle, token) = stop_channel();
        let executor = Arc::new(StopOnReinit {
            inner: RecordingExecutor::default(),
            handle,
        });
        let keeper = keeper(reader, executor.clone(), vec![pool_config()], Duration::ZERO);

        let summary = keeper.run_pass(&token).await;

        assert_eq!(summary.breaches, 1);
        assert_eq!(summary.liquidated, 1);
        assert_eq!(executor.inner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_before_start_runs_nothing() {
        let executor = Arc::new(RecordingExecutor::default());
        let keeper = keeper(breached_reader(), executor.clone(), vec![pool_config()], Duration::ZERO);

        let (handle, token) = stop_channel();
        handle.stop();

        assert_eq!(keeper.run(token).await, 0);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let executor = Arc::new(RecordingExecutor::default());
        let keeper = keeper(
            breached_reader(),
            executor.clone(),
            vec![pool_config()],
            Duration::from_secs(3_600),
        );

        let (handle, token) = stop_channel();
        let run = async {
            tokio::join!(keeper.run(token), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                handle.stop();
            })
        };

        let (passes, ()) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("keeper did not stop");
        assert_eq!(passes, 1);
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn test_dropped_handle_stops() {
        let (handle, token) = stop_channel();
        assert!(!token.is_stopped());
        drop(handle);
        assert!(token.is_stopped());
    }
}
