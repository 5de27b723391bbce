pub mod browser;
pub mod core;
pub mod dedup;
pub mod enrich;
pub mod extract;
pub mod orchestrator;

// --- Primary exports ---
pub use crate::core::config::{load_config, ScoutConfig};
pub use crate::core::error::ScoutError;
pub use crate::core::types::{AggregateOutput, Card, CardStats, KeywordFailure, RunMeta};
pub use crate::dedup::KeywordResult;
pub use crate::orchestrator::{Orchestrator, RunSummary};
