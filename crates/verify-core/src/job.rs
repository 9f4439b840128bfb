//! The job document: metrics, measurements, blobs and free metadata.
//!
//! A [`Job`] enforces measurement uniqueness, shares blobs by identifier and
//! round-trips through a self-describing JSON document:
//!
//! ```text
//! { "meta": {..}, "metrics": {name: definition}, "measurements": [..], "blobs": [..] }
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::definitions::MetricSet;
use crate::domain::blob::Blob;
use crate::domain::error::{Result, VerifyError};
use crate::domain::measurement::{Measurement, MeasurementRecord};
use crate::domain::metric::Metric;
use crate::obs;

/// Aggregates everything produced by one measurement run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    metrics: MetricSet,
    measurements: Vec<Measurement>,
    blobs: Vec<Arc<Blob>>,
    meta: BTreeMap<String, serde_json::Value>,
}

/// Serialized layout of a [`Job`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct JobDocument {
    #[serde(default)]
    meta: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    measurements: Vec<MeasurementRecord>,
    #[serde(default)]
    blobs: Vec<Blob>,
}

impl Job {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a job that already knows the metric definitions it reports on.
    pub fn with_metrics(metrics: MetricSet) -> Self {
        Self {
            metrics,
            ..Self::default()
        }
    }

    pub fn metrics(&self) -> &MetricSet {
        &self.metrics
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn blobs(&self) -> &[Arc<Blob>] {
        &self.blobs
    }

    pub fn meta(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.meta
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Add a metric definition; fails on a conflicting definition of the same name.
    pub fn add_metric(&mut self, metric: impl Into<Arc<Metric>>) -> Result<()> {
        self.metrics.insert(metric)
    }

    /// Add a blob unless one with the same identifier is already present.
    ///
    /// Returns the blob the job keeps for that identifier.
    pub fn register_blob(&mut self, blob: Arc<Blob>) -> Arc<Blob> {
        if let Some(existing) = self.blobs.iter().find(|b| b.identifier() == blob.identifier()) {
            obs::emit_blob_registered(blob.identifier(), blob.name(), true);
            return Arc::clone(existing);
        }
        obs::emit_blob_registered(blob.identifier(), blob.name(), false);
        self.blobs.push(Arc::clone(&blob));
        blob
    }

    /// Add a measurement together with its metric and linked blobs.
    ///
    /// Fails with `DuplicateMeasurement` when a measurement with the same
    /// (metric, spec level, filter) tuple or the same identifier exists, and
    /// with `DuplicateMetric` when the measurement's metric conflicts with the
    /// job's definition of that name.
    pub fn register_measurement(&mut self, mut measurement: Measurement) -> Result<()> {
        let identifier = measurement.identifier();
        let duplicate = self.measurements.iter().any(|m| {
            m.identifier() == identifier
                || (m.metric_name() == measurement.metric_name()
                    && m.spec_name() == measurement.spec_name()
                    && m.filter_name() == measurement.filter_name())
        });
        if duplicate {
            return Err(VerifyError::DuplicateMeasurement {
                metric: measurement.metric_name().to_string(),
                spec_name: measurement.spec_name().map(str::to_string),
                filter_name: measurement.filter_name().map(str::to_string),
            });
        }

        self.metrics.insert(Arc::clone(measurement.metric()))?;
        if let Some(shared) = self.metrics.get(measurement.metric_name()) {
            measurement.set_metric(Arc::clone(shared));
        }
        for blob in measurement.blobs_mut() {
            *blob = self.register_blob(Arc::clone(blob));
        }

        obs::emit_measurement_registered(&identifier, measurement.metric_name(), measurement.is_measured());
        self.measurements.push(measurement);
        Ok(())
    }

    /// Find the unique measurement of `metric_name`.
    ///
    /// Each given disambiguator narrows the candidates to exact matches when
    /// there are any, otherwise to measurements that leave it unset.
    pub fn get_measurement(
        &self,
        metric_name: &str,
        spec_name: Option<&str>,
        filter_name: Option<&str>,
    ) -> Result<&Measurement> {
        let mut candidates: Vec<&Measurement> = self
            .measurements
            .iter()
            .filter(|m| m.metric_name() == metric_name)
            .collect();
        if let Some(level) = spec_name {
            candidates = narrow(candidates, level, Measurement::spec_name);
        }
        if let Some(filter) = filter_name {
            candidates = narrow(candidates, filter, Measurement::filter_name);
        }

        match candidates.as_slice() {
            [only] => Ok(only),
            [] => Err(VerifyError::MeasurementNotFound {
                metric: metric_name.to_string(),
                spec_name: spec_name.map(str::to_string),
                filter_name: filter_name.map(str::to_string),
            }),
            many => Err(VerifyError::AmbiguousMeasurement {
                metric: metric_name.to_string(),
                spec_name: spec_name.map(str::to_string),
                filter_name: filter_name.map(str::to_string),
                candidates: many.len(),
            }),
        }
    }

    /// Names of metrics with at least one measured quantity, in registration order.
    pub fn available_metrics(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for m in self.measurements.iter().filter(|m| m.is_measured()) {
            if !names.contains(&m.metric_name()) {
                names.push(m.metric_name());
            }
        }
        names
    }

    /// Specification levels defined by the metrics of registered measurements.
    pub fn available_spec_levels(&self) -> Vec<&str> {
        let mut levels: Vec<&str> = Vec::new();
        for m in &self.measurements {
            for spec in m.metric().specs() {
                if !levels.contains(&spec.name()) {
                    levels.push(spec.name());
                }
            }
        }
        levels
    }

    // -- documents ----------------------------------------------------------

    /// Serialize to the job document. Metric references are written by name;
    /// each referenced metric must be one of the job's metrics.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut metrics = BTreeMap::new();
        for metric in self.metrics.iter() {
            metrics.insert(metric.name().to_string(), metric.to_definition(&self.metrics)?);
        }
        let document = JobDocument {
            meta: self.meta.clone(),
            metrics,
            measurements: self.measurements.iter().map(Measurement::to_record).collect(),
            blobs: self.blobs.iter().map(|b| Blob::clone(b)).collect(),
        };
        Ok(serde_json::to_value(document)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json()?)?)
    }

    /// Rebuild a job from its document, re-linking shared blobs.
    pub fn from_json(document: &serde_json::Value) -> Result<Self> {
        let document = JobDocument::deserialize(document)?;
        let mut job = Job::new();
        job.meta = document.meta;

        let definitions = serde_json::Value::Object(document.metrics.into_iter().collect());
        if let Some(entries) = definitions.as_object() {
            for name in entries.keys() {
                job.metrics.insert(Metric::from_definition(name, &definitions)?)?;
            }
        }
        for blob in document.blobs {
            job.register_blob(Arc::new(blob));
        }

        for record in document.measurements {
            let metric = job
                .metrics
                .get(&record.metric)
                .cloned()
                .ok_or_else(|| VerifyError::MetricNotFound(record.metric.clone()))?;
            let blobs = &job.blobs;
            let measurement = Measurement::from_record(record, metric, |id| {
                blobs
                    .iter()
                    .find(|b| b.identifier() == id)
                    .cloned()
                    .ok_or_else(|| VerifyError::BlobNotFound(id.to_string()))
            })?;
            job.register_measurement(measurement)?;
        }
        Ok(job)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_json(&serde_json::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let job = Self::from_json_str(&text)?;
        obs::emit_job_read(path, job.measurements.len(), job.blobs.len());
        Ok(job)
    }

    /// Write the document atomically: a temp file in the destination
    /// directory is renamed over `path`, so no partial file is ever visible.
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = self.to_json_string()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        obs::emit_job_written(path, self.measurements.len(), self.blobs.len());
        Ok(())
    }
}

fn narrow<'a>(
    candidates: Vec<&'a Measurement>,
    wanted: &str,
    field: fn(&Measurement) -> Option<&str>,
) -> Vec<&'a Measurement> {
    let (exact, rest): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|m| field(m) == Some(wanted));
    if !exact.is_empty() {
        return exact;
    }
    rest.into_iter().filter(|m| field(m).is_none()).collect()
}
