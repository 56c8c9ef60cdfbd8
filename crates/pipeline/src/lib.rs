#![doc = include_str!("../README.md")]

pub mod alert;
pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod index;
pub mod processor;
pub mod retention;
pub mod transport;

// --- 주요 타입 re-export ---

pub use alert::{AlertEngine, AlertRule, MatchPredicate, DEFAULT_COOLDOWN};
pub use cache::SearchCache;
pub use collector::{spawn_flush_task, CollectorAgent};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::PipelineError;
pub use index::{SearchQuery, SearchResult, TierSummary, TimePartitionedIndex};
pub use processor::{LineParser, LogProcessor};
pub use retention::{
    ColdStore, JsonFileColdStore, MemoryColdStore, RetentionManager, SweepReport,
};
pub use transport::{LogBatch, RawLine, Subscriber, Transport, TransportBus};
