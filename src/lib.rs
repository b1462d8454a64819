//! recopy - duplicate records from inside a workflow
//!
//! recopy provides the `duplicate-record` workflow node: given a record in a
//! schema-defined collection, it creates a new record with the same values,
//! minus bookkeeping fields and relation fields, with selected fields
//! overridden. The node reports a job status (resolved or failed) back to the
//! engine and can downgrade a stored failure on resume when configured to
//! ignore failures.
//!
//! ## Example
//!
//! ```yaml
//! name: clone-task
//!
//! nodes:
//!   - id: dup
//!     type: duplicate-record
//!     config:
//!       collection_name: tasks
//!       source_record_id: "{{ input.task_id }}"
//!       overrides:
//!         - field: status
//!           value: open
//!       ignore_failure: false
//! ```
//!
//! Fields copied: every field of the source snapshot that the collection
//! schema defines as a scalar, except `id`, `createdAt`, `updatedAt`,
//! `createdById`, `updatedById`, `createdBy`, `updatedBy`, `__v` and `sort`.
//! belongsTo links survive through their foreign key columns.

pub mod collections;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod nodes;
pub mod storage;
pub mod telemetry;
pub mod workflow;

pub use error::{Error, Result};
