//! Metric verification core library.
//!
//! Defines metrics and their specification levels, records measurements with
//! their provenance, and serializes everything into a self-describing job
//! document.

pub mod definitions;
pub mod domain;
pub mod job;
pub mod obs;
pub mod producer;
pub mod report;
pub mod telemetry;
pub mod units;

pub use definitions::MetricSet;

pub use domain::{
    Blob, Datum, DatumSet, DatumValue, Dependency, Measurement, Metric, MetricRef, Operator, Quantity,
    Reference, Registration, Result, Specification, VerifyError,
};

pub use job::Job;

pub use producer::{MeasurementProducer, ProducerRegistry, ProducerRegistryBuilder};

pub use report::{check_job, render_check, render_report, Verdict};

pub use telemetry::init_tracing;

pub use units::{StandardUnits, Unit, UnitSystem};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
