//! One-shot, resumable migration of a multi-tenant CRM dataset from a
//! document store export to PostgreSQL.
//!
//! The engine reads raw documents collection by collection, remaps
//! 24-hex-character ObjectIds to freshly minted UUIDs, transforms each
//! record to its relational shape, and writes duplicate-tolerant batches in
//! a fixed dependency-ordered phase plan. Embedded reference arrays become
//! link-table rows in the terminal phase. Progress checkpoints to a JSON
//! state file after every table (and periodically within one), so an
//! interrupted run resumes without duplicating rows. A four-layer validator
//! audits the result afterwards.
//!
//! Entry points: [`orchestrator::Orchestrator`] for a migration run,
//! [`validator::Validator`] for the post-migration audit.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod idmap;
pub mod journal;
pub mod junction;
pub mod loader;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod store;
pub mod transform;
pub mod validator;

pub use config::Config;
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, Orchestrator};
pub use validator::{ValidationReport, Validator};
