//! Core coordinator for the quotation processing pipeline.
//!
//! This crate owns the checkpoint-driven state machine that takes one
//! `QuoteRequest` from claim to a terminal status, coordinating the
//! analysis, shopping, extraction, vehicle, and ledger services without
//! implementing any of their external protocols itself.

pub mod batch;
pub mod block_search;
pub mod candidate_probe;
pub mod claim;
pub mod coordinator;
pub mod error;
pub mod files;
pub mod recovery;
pub mod sinks;

pub use batch::{BatchCoordinator, BatchError};
pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use recovery::{RecoveryError, RecoveryReport, RecoveryService};
