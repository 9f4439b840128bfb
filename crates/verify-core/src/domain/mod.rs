//! Domain models for metric verification.
//!
//! Canonical definitions for the core entities:
//! - `Datum`: a value with unit, label and description
//! - `Metric` / `Specification`: what is measured and its thresholds
//! - `Measurement`: one evaluation of a metric with its provenance
//! - `Blob`: datums shared between measurements

pub mod blob;
pub mod datum;
pub mod datum_set;
pub mod error;
pub mod measurement;
pub mod metric;
pub mod spec;

// Re-export main types and errors
pub use blob::Blob;
pub use datum::{Datum, DatumValue, Quantity};
pub use datum_set::{DatumSet, Registration};
pub use error::{Result, VerifyError};
pub use measurement::Measurement;
pub use metric::{Metric, Operator, Reference};
pub use spec::{Dependency, MetricRef, Specification};
