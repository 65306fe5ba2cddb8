use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ensure_after, SnapshotStore};
use crate::error::StoreError;
use crate::models::{OiSnapshot, Symbol, SymbolKind};

/// Process-local store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    symbols: Vec<Symbol>,
    snapshots: HashMap<i64, Vec<OiSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored snapshots across symbols
    pub async fn snapshot_count(&self) -> usize {
        self.inner.read().await.snapshots.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get_symbol(&self, name: &str) -> Result<Option<Symbol>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.symbols.iter().find(|s| s.name == name).cloned())
    }

    async fn create_symbol(&self, name: &str, kind: SymbolKind) -> Result<Symbol, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.symbols.iter().any(|s| s.name == name) {
            return Err(StoreError::DuplicateSymbol(name.to_string()));
        }

        let symbol = Symbol {
            id: inner.symbols.len() as i64 + 1,
            name: name.to_string(),
            kind,
        };
        inner.symbols.push(symbol.clone());
        Ok(symbol)
    }

    async fn latest_snapshot(&self, symbol: &Symbol) -> Result<Option<OiSnapshot>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.snapshots.get(&symbol.id).and_then(|rows| rows.last()).cloned())
    }

    async fn save_snapshot(&self, symbol: &Symbol, snapshot: &OiSnapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.symbols.iter().any(|s| s.id == symbol.id) {
            return Err(StoreError::UnknownSymbol(symbol.name.clone()));
        }

        let rows = inner.snapshots.entry(symbol.id).or_default();
        ensure_after(rows.last(), snapshot)?;
        rows.push(snapshot.clone());
        Ok(())
    }

    async fn list_symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        Ok(self.inner.read().await.symbols.clone())
    }

    async fn recent_snapshots(&self, symbol: &Symbol, limit: usize) -> Result<Vec<OiSnapshot>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(&symbol.id)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
