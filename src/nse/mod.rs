pub mod models;
pub mod nse_client;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::SymbolKind;

// Re-exports (public API)
pub use models::{ChainBody, EquityChain, FuturesContract, IndexChain, RawChainPayload, SideDetail, SideTotals, StrikeRecord};
pub use nse_client::NseClient;

/// Anything that can produce a raw option chain for a symbol.
///
/// The caller resolves `kind`; implementations must not guess it.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch(&self, symbol: &str, kind: SymbolKind) -> Result<RawChainPayload, SourceError>;
}
