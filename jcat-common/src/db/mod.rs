//! Property graph storage

pub mod graph;
pub mod init;
pub mod models;
pub mod query;

pub use graph::{GraphStore, RedundantPlan, SwapOutcome, SwapPlan};
pub use init::*;
pub use models::*;
pub use query::GraphQuery;
