//! Structured observability hooks for job lifecycle events.
//!
//! This module provides:
//! - A job-scoped tracing span via the `JobSpan` RAII guard
//! - Emission functions for registration, specification checks and document I/O
//!
//! Registration and check events are emitted at `debug!`, document writes at
//! `info!`. Filtering follows `RUST_LOG` (see [`crate::telemetry`]).

use tracing::{debug, info};

/// RAII guard that enters a span tagged with a job label (usually a path).
///
/// # Example
///
/// ```ignore
/// let _span = JobSpan::enter("validate_drp.json");
/// // events emitted while the guard lives carry job = "validate_drp.json"
/// ```
pub struct JobSpan {
    _span: tracing::span::EnteredSpan,
}

impl JobSpan {
    pub fn enter(job: &str) -> Self {
        let span = tracing::info_span!("verify.job", job = %job);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a measurement was added to a job.
pub fn emit_measurement_registered(identifier: &str, metric: &str, measured: bool) {
    debug!(
        event = "measurement.registered",
        identifier = %identifier,
        metric = %metric,
        measured = measured,
    );
}

/// Emit event: a blob was added to a job (`shared` when already present).
pub fn emit_blob_registered(identifier: &str, name: &str, shared: bool) {
    debug!(
        event = "blob.registered",
        identifier = %identifier,
        name = %name,
        shared = shared,
    );
}

/// Emit event: a measured value was compared with a specification.
pub fn emit_spec_checked(metric: &str, level: &str, filter_name: Option<&str>, passed: bool) {
    debug!(
        event = "spec.checked",
        metric = %metric,
        level = %level,
        filter_name = filter_name.unwrap_or(""),
        passed = passed,
    );
}

/// Emit event: a job document was written.
pub fn emit_job_written(path: &std::path::Path, measurements: usize, blobs: usize) {
    info!(
        event = "job.written",
        path = %path.display(),
        measurements = measurements,
        blobs = blobs,
    );
}

/// Emit event: a job document was read back.
pub fn emit_job_read(path: &std::path::Path, measurements: usize, blobs: usize) {
    debug!(
        event = "job.read",
        path = %path.display(),
        measurements = measurements,
        blobs = blobs,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_create() {
        let _span = JobSpan::enter("job.json");
        emit_spec_checked("AM1", "design", Some("r"), true);
    }
}
