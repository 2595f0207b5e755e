//! jcat-ri library - Relationship Integrity
//!
//! Keeps the catalog graph consistent: audits relationship direction and
//! endpoint ids, repairs what the audit finds, mirrors relationships into
//! denormalized entity fields, keeps jingle order inside each fabrica dense,
//! and runs named cleanup scripts over all of it.

pub mod audit;
pub mod catalog;
pub mod cleanup;
pub mod cli;
pub mod fix;
pub mod order;
pub mod report;
pub mod sync;

pub use audit::{AuditEngine, AuditReport};
pub use catalog::Catalog;
pub use cleanup::{CleanupContext, CleanupRegistry, CleanupScript, ScriptMode, ScriptReport};
pub use fix::{FixEngine, FixReport};
pub use order::{assign_dense_order, OrderManager, OrderOutcome};
pub use sync::{SyncReport, Synchronizer};
