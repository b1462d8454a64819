//! Storage layer for jobs.

mod models;
mod sqlite;

pub use models::Job;
pub use sqlite::JobStore;
