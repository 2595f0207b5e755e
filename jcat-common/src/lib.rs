//! # Jingle Catalog Common Library
//!
//! Shared code for the catalog tools:
//! - Entity id codec and relationship schema registry
//! - Property graph storage (SQLite) and its typed query builder
//! - Catalog events and the event bus
//! - Configuration loading
//! - Timestamp and date normalization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod schema;
pub mod time;

pub use error::{Error, Result};
pub use ids::EntityType;
pub use schema::{RelationshipSchema, RelationshipSpec, RelationshipType};
