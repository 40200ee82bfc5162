//! Single-tile operations, the batch orchestrator, and the job ledger

pub mod batch;
pub mod ledger;
pub mod ops;

pub use batch::{BatchOptions, BatchOrchestrator, BatchReport, TileFailure};
pub use ledger::{JobLedger, LedgerEntry, SkipStatus};
pub use ops::{classify_tile, derived_name, index_tile, prepare_training, ClassificationJob, Outcome};
