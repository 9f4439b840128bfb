//! Domain-level error taxonomy for metric verification.

/// Verification domain errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    // -- definition errors --------------------------------------------------
    #[error("metric not found: {0}")]
    MetricNotFound(String),

    #[error("malformed metric {metric}: {reason}")]
    MalformedMetric { metric: String, reason: String },

    #[error("metric {0} is already registered with a different definition")]
    DuplicateMetric(String),

    // -- resolution errors --------------------------------------------------
    #[error("metric {metric} has no {level} specification")]
    SpecificationNotFound { metric: String, level: String },

    #[error("metric {metric} has no {level} specification for filter {filter}")]
    UnknownFilter {
        metric: String,
        level: String,
        filter: String,
    },

    #[error("metric {metric} has several {level} specifications matching filter {filter:?}")]
    AmbiguousSpecification {
        metric: String,
        level: String,
        filter: Option<String>,
    },

    #[error("cannot resolve dependency {dependency} of {metric} {level} specification: {reason}")]
    DependencyResolution {
        metric: String,
        level: String,
        dependency: String,
        reason: String,
    },

    #[error("{candidates} measurements of {metric} match spec_name={spec_name:?} filter_name={filter_name:?}")]
    AmbiguousMeasurement {
        metric: String,
        spec_name: Option<String>,
        filter_name: Option<String>,
        candidates: usize,
    },

    #[error("{owner} has no registered datum named {name}")]
    UnknownDatum { owner: String, name: String },

    // -- unit errors --------------------------------------------------------
    #[error("invalid unit {unit:?}: {reason}")]
    InvalidUnit { unit: String, reason: String },

    #[error("unit {from:?} cannot be converted to {to:?}")]
    IncompatibleUnits { from: String, to: String },

    // -- duplicate registration ---------------------------------------------
    #[error("measurement of {metric} (spec_name={spec_name:?}, filter_name={filter_name:?}) is already registered")]
    DuplicateMeasurement {
        metric: String,
        spec_name: Option<String>,
        filter_name: Option<String>,
    },

    #[error("measurement producer already registered: {0}")]
    DuplicateProducer(String),

    // -- not found ----------------------------------------------------------
    #[error("no measurement of {metric} matches spec_name={spec_name:?} filter_name={filter_name:?}")]
    MeasurementNotFound {
        metric: String,
        spec_name: Option<String>,
        filter_name: Option<String>,
    },

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("measurement producer not found: {0}")]
    ProducerNotFound(String),

    // -- documents and I/O --------------------------------------------------
    #[error("unsupported definitions file: {0}")]
    UnsupportedFormat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    pub(crate) fn malformed(metric: &str, reason: impl Into<String>) -> Self {
        VerifyError::MalformedMetric {
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }

    /// Attribute an `UnknownDatum` error to the registry's owner.
    pub(crate) fn with_owner(self, owner: &str) -> Self {
        match self {
            VerifyError::UnknownDatum { name, .. } => VerifyError::UnknownDatum {
                owner: owner.to_string(),
                name,
            },
            other => other,
        }
    }
}

/// Result type for verification domain operations.
pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_filter_display() {
        let err = VerifyError::UnknownFilter {
            metric: "AM1".to_string(),
            level: "design".to_string(),
            filter: "g".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AM1"));
        assert!(msg.contains("design"));
        assert!(msg.contains("filter g"));
    }

    #[test]
    fn test_incompatible_units_display() {
        let err = VerifyError::IncompatibleUnits {
            from: "arcsec".to_string(),
            to: "mag".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unit \"arcsec\" cannot be converted to \"mag\""
        );
    }

    #[test]
    fn test_malformed_helper() {
        let err = VerifyError::malformed("PA1", "missing operator");
        assert!(err.to_string().contains("malformed metric PA1"));
        assert!(err.to_string().contains("missing operator"));
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VerifyError = io.into();
        assert!(err.to_string().contains("io error"));
    }
}
