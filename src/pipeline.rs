use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{FetchError, PipelineError};
use crate::models::{OiSnapshot, SymbolKind};
use crate::nse::ChainSource;
use crate::store::SnapshotStore;
use crate::{processor, rules, snapshot};

// -----------------------------------------------
// PER-SYMBOL WRITE SERIALIZATION
// -----------------------------------------------

/// One async mutex per symbol; different symbols never contend
#[derive(Default)]
pub struct SymbolLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SymbolLocks {
    pub async fn acquire(&self, symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(symbol.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the entry for `symbol` once nobody holds or waits on it
    pub async fn release(&self, symbol: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(symbol).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(symbol);
        }
    }

    /// Number of symbols with a live entry
    pub async fn tracked_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

// -----------------------------------------------
// PIPELINE
// -----------------------------------------------

/// fetch → aggregate → classify → build → save, for one symbol at a time
pub struct Pipeline<C, S> {
    source: C,
    store: S,
    index_symbols: Vec<String>,
    locks: SymbolLocks,
}

impl<C: ChainSource, S: SnapshotStore> Pipeline<C, S> {
    pub fn new(source: C, store: S, index_symbols: Vec<String>) -> Self {
        Self {
            source,
            store,
            index_symbols,
            locks: SymbolLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &SymbolLocks {
        &self.locks
    }

    /// Run one cycle, stamping the snapshot with the local time the data arrived
    pub async fn run_cycle(&self, symbol: &str) -> Result<OiSnapshot, PipelineError> {
        self.run_cycle_with(symbol, || Local::now().naive_local()).await
    }

    /// Run one cycle with an explicit capture time
    pub async fn run_cycle_at(&self, symbol: &str, captured_at: NaiveDateTime) -> Result<OiSnapshot, PipelineError> {
        self.run_cycle_with(symbol, move || captured_at).await
    }

    async fn run_cycle_with<F>(&self, symbol: &str, clock: F) -> Result<OiSnapshot, PipelineError>
    where
        F: FnOnce() -> NaiveDateTime + Send,
    {
        let name = symbol.trim().to_uppercase();
        if name.is_empty() {
            return Err(FetchError::InvalidSymbol(symbol.to_string()).into());
        }

        // Held until the snapshot is saved, so the next run reads it as `previous`
        let guard = self.locks.acquire(&name).await;
        let result = self.cycle(&name, clock).await;
        drop(guard);
        self.locks.release(&name).await;

        result
    }

    async fn cycle<F>(&self, name: &str, clock: F) -> Result<OiSnapshot, PipelineError>
    where
        F: FnOnce() -> NaiveDateTime + Send,
    {
        let existing = self.store.get_symbol(name).await?;
        let kind = existing
            .as_ref()
            .map(|s| s.kind)
            .unwrap_or_else(|| SymbolKind::resolve(name, &self.index_symbols));

        let payload = self.source.fetch(name, kind).await?;
        let captured_at = clock();

        // Register only symbols the provider knows about
        let symbol = match existing {
            Some(symbol) => symbol,
            None => {
                info!(symbol = %name, kind = kind.as_str(), "Registering new symbol");
                self.store.create_symbol(name, kind).await?
            }
        };

        let previous = self.store.latest_snapshot(&symbol).await?;
        let metrics = processor::aggregate(&payload, previous.as_ref())?;
        let (interpretation, signal) = rules::classify(&metrics)?;
        let snapshot = snapshot::build(&symbol, &metrics, interpretation, signal, captured_at)?;

        self.store.save_snapshot(&symbol, &snapshot).await?;

        debug!(
            symbol = %name,
            first_observation = previous.is_none(),
            call_oi = snapshot.call_oi,
            put_oi = snapshot.put_oi,
            future_oi = snapshot.future_oi,
            "Snapshot saved"
        );
        info!(
            symbol = %name,
            ltp = snapshot.ltp,
            change_in_ltp = snapshot.change_in_ltp,
            interpretation = %interpretation,
            signal = %signal,
            "Cycle complete"
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_entry_released_when_idle() {
        let locks = SymbolLocks::default();

        let guard = locks.acquire("NIFTY").await;
        drop(guard);
        locks.release("NIFTY").await;
        assert_eq!(locks.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_held() {
        let locks = SymbolLocks::default();

        let held = locks.acquire("NIFTY").await;
        let other = locks.acquire("RELIANCE").await;
        drop(other);
        locks.release("NIFTY").await;
        locks.release("RELIANCE").await;
        assert_eq!(locks.tracked_count().await, 1);

        drop(held);
        locks.release("NIFTY").await;
        assert_eq!(locks.tracked_count().await, 0);
    }
}
