//! Core types for kindred.

mod link;
mod record;

pub use link::*;
pub use record::*;
