//! Metrics for recopy.
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op, so the host engine decides where they go.
//!
//! ## Metrics
//!
//! ### Counters
//! - `recopy_duplications_total` - Duplicate-record runs by outcome status
//! - `recopy_fields_copied_total` - Fields written to new records
//! - `recopy_resumes_total` - Resume calls by transition (downgraded/unchanged)
//! - `recopy_jobs_total` - Jobs persisted by the processor, by node type and status
//!
//! ### Histograms
//! - `recopy_duplication_duration_seconds` - Duplicate-record run duration

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one duplicate-record run.
pub fn record_duplication(status: &str, duration: Duration) {
    counter!(
        "recopy_duplications_total",
        "status" => status.to_string()
    )
    .increment(1);

    histogram!("recopy_duplication_duration_seconds").record(duration.as_secs_f64());
}

/// Record how many fields went into a new record.
pub fn record_fields_copied(count: usize) {
    counter!("recopy_fields_copied_total").increment(count as u64);
}

/// Record a resume call.
pub fn record_resume(transition: &str) {
    counter!(
        "recopy_resumes_total",
        "transition" => transition.to_string()
    )
    .increment(1);
}

/// Record a job persisted by the processor.
pub fn record_job(node_type: &str, status: &str) {
    counter!(
        "recopy_jobs_total",
        "node_type" => node_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
