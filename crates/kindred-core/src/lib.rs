//! kindred-core - Core library for kindred.
//!
//! This crate provides probabilistic record matching: a property model that
//! turns field comparisons into a match probability, a token index that
//! retrieves candidate records, a multi-threaded match engine for
//! deduplication and record linkage, and link stores that persist and infer
//! the resulting judgments.
//!
//! # Example
//!
//! ```ignore
//! use kindred_core::{EventRecorder, InMemoryDataSource, MatchConfig, MatchEngine};
//!
//! let config = MatchConfig::from_file("kindred.toml")?;
//! let recorder = EventRecorder::new();
//! let mut engine = MatchEngine::from_config(&config)?.with_listener(recorder.clone());
//!
//! engine.deduplicate(vec![Box::new(InMemoryDataSource::new(records))])?;
//! for (r1, r2, confidence) in recorder.recorded_matches() {
//!     println!("{:?} = {:?} ({:.3})", r1.value("ID"), r2.value("ID"), confidence);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod links;
pub mod listeners;
pub mod model;
pub mod types;

// Re-export commonly used types
pub use config::{
    EngineConfig, IndexConfig, LinkStoreConfig, LinkStoreProvider, MatchConfig, PropertyConfig,
};
pub use engine::{
    AcceptanceStrategy, DataSource, Group, InMemoryDataSource, MatchEngine, MatchListener,
    ProfileReport, ProfileStats,
};
pub use error::{ErrorCode, KindredError, KindredResult};
pub use index::{Candidate, InMemoryCandidateIndex, StorageBackend};
pub use links::{load_gold_standard, Inconsistency, InMemoryLinkStore, LinkStore};
pub use listeners::{EvaluationListener, EventRecorder, LinkStoreListener, LoggingListener};
pub use model::{
    Comparator, ComparatorKind, LookupPolicy, MatchClass, Property, PropertyModel, PropertyRole,
};
pub use types::{Link, LinkKind, LinkStatus, Record};
