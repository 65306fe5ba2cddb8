use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::OiSnapshot;
use crate::nse::ChainSource;
use crate::pipeline::Pipeline;
use crate::store::SnapshotStore;

/// Result of one symbol's cycle within a tick
#[derive(Debug)]
pub struct CycleOutcome {
    pub symbol: String,
    pub result: Result<OiSnapshot, PipelineError>,
}

/// Drives `run_cycle` for a watch list on a fixed cadence
pub struct Scheduler<C, S> {
    pipeline: Arc<Pipeline<C, S>>,
    symbols: Vec<String>,
    interval: Duration,
    max_concurrent: usize,
}

impl<C, S> Scheduler<C, S>
where
    C: ChainSource + 'static,
    S: SnapshotStore + 'static,
{
    pub fn new(pipeline: Arc<Pipeline<C, S>>, symbols: Vec<String>, interval: Duration, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            symbols,
            interval,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// One cycle per symbol, concurrently; a failing symbol never affects the others
    pub async fn run_once(&self) -> Vec<CycleOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(self.symbols.len());

        for symbol in &self.symbols {
            let pipeline = Arc::clone(&self.pipeline);
            let sem = Arc::clone(&semaphore);
            let symbol = symbol.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Aborted(format!("semaphore closed: {}", e)))?;
                pipeline.run_cycle(&symbol).await
            });
            handles.push(handle);
        }

        let joined = futures::future::join_all(handles).await;

        let mut outcomes = Vec::with_capacity(joined.len());
        for (symbol, task) in self.symbols.iter().zip(joined) {
            let result = match task {
                Ok(res) => res,
                Err(e) => Err(PipelineError::Aborted(e.to_string())),
            };

            if let Err(e) = &result {
                if e.is_retryable() {
                    warn!(symbol = %symbol, kind = e.kind(), error = %e, "Cycle skipped, will retry next tick");
                } else {
                    warn!(symbol = %symbol, kind = e.kind(), error = %e, "Cycle failed");
                }
            }

            outcomes.push(CycleOutcome { symbol: symbol.clone(), result });
        }

        outcomes
    }

    /// Tick until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            symbols = self.symbols.len(),
            interval_secs = self.interval.as_secs(),
            max_concurrent = self.max_concurrent,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let outcomes = self.run_once().await;
                    let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
                    info!(
                        ok,
                        failed = outcomes.len() - ok,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Tick complete"
                    );
                }
            }
        }
    }
}
