pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{OiSnapshot, Symbol, SymbolKind};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage collaborator of the pipeline.
///
/// Implementations append snapshots per symbol in strictly increasing
/// capture time and reject anything else with [`StoreError::OutOfOrder`].
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_symbol(&self, name: &str) -> Result<Option<Symbol>, StoreError>;

    async fn create_symbol(&self, name: &str, kind: SymbolKind) -> Result<Symbol, StoreError>;

    async fn latest_snapshot(&self, symbol: &Symbol) -> Result<Option<OiSnapshot>, StoreError>;

    async fn save_snapshot(&self, symbol: &Symbol, snapshot: &OiSnapshot) -> Result<(), StoreError>;

    async fn list_symbols(&self) -> Result<Vec<Symbol>, StoreError>;

    /// Newest first
    async fn recent_snapshots(&self, symbol: &Symbol, limit: usize) -> Result<Vec<OiSnapshot>, StoreError>;
}

#[async_trait]
impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    async fn get_symbol(&self, name: &str) -> Result<Option<Symbol>, StoreError> {
        (**self).get_symbol(name).await
    }

    async fn create_symbol(&self, name: &str, kind: SymbolKind) -> Result<Symbol, StoreError> {
        (**self).create_symbol(name, kind).await
    }

    async fn latest_snapshot(&self, symbol: &Symbol) -> Result<Option<OiSnapshot>, StoreError> {
        (**self).latest_snapshot(symbol).await
    }

    async fn save_snapshot(&self, symbol: &Symbol, snapshot: &OiSnapshot) -> Result<(), StoreError> {
        (**self).save_snapshot(symbol, snapshot).await
    }

    async fn list_symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        (**self).list_symbols().await
    }

    async fn recent_snapshots(&self, symbol: &Symbol, limit: usize) -> Result<Vec<OiSnapshot>, StoreError> {
        (**self).recent_snapshots(symbol, limit).await
    }
}

/// Shared ordering check for implementations
pub(crate) fn ensure_after(latest: Option<&OiSnapshot>, snapshot: &OiSnapshot) -> Result<(), StoreError> {
    match latest {
        Some(prev) if snapshot.captured_at() <= prev.captured_at() => Err(StoreError::OutOfOrder {
            symbol: snapshot.symbol.clone(),
            captured_at: snapshot.captured_at(),
            latest: prev.captured_at(),
        }),
        _ => Ok(()),
    }
}
