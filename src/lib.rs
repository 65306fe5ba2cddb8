pub mod api_server;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod nse;
pub mod pipeline;
pub mod processor;
pub mod rules;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod summary;

// Re-exports for convenience
pub use config::{AppConfig, Mode};
pub use error::{FetchError, PipelineError, StoreError};
pub use models::{Interpretation, OiSnapshot, Signal, Symbol, SymbolKind};
pub use nse::{ChainSource, NseClient};
pub use pipeline::Pipeline;
pub use scheduler::Scheduler;
pub use store::{MemoryStore, SnapshotStore, SqliteStore};
