//! kindred-link-stores - Persistent link store implementations for kindred.
//!
//! This crate provides relational storage for match judgments behind the
//! [`LinkStore`] contract of kindred-core, plus a factory that builds any
//! configured store.
//!
//! # Supported Backends
//!
//! - **Memory** - the in-memory store from kindred-core
//! - **SQLite** (feature: `sqlite`, default) - single-file relational store

mod factory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use factory::LinkStoreFactory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLinkStore;

// Re-export core types
pub use kindred_core::config::{LinkStoreConfig, LinkStoreProvider};
pub use kindred_core::links::{InMemoryLinkStore, LinkStore};
