//! Core types and trait definitions for the Sift knowledge deduplicator.
//!
//! Knowledge items and stores, plans, jobs and backups, the analyzer boundary,
//! and the traits every external collaborator implements. No HTTP or database
//! code lives here; `sift-batch`, `sift-store-sqlite` and `sift-api` build on
//! top of it.

pub mod analysis;
pub mod artifact;
pub mod error;
pub mod item;
pub mod job;
pub mod ledger;
pub mod plan;
pub mod ports;
pub mod store;

pub use error::{Error, Result};
