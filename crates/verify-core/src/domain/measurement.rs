//! Measurements of a metric with their provenance.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::blob::Blob;
use crate::domain::datum::{float_repr, Datum, DatumValue, Quantity};
use crate::domain::datum_set::{DatumSet, Registration};
use crate::domain::error::{Result, VerifyError};
use crate::domain::metric::Metric;
use crate::job::Job;
use crate::units::{self, UnitSystem};

/// One evaluation of a metric.
///
/// A `None` quantity records that the metric could not be measured, which is
/// distinct from a measured zero. The quantity unit must convert to the
/// metric unit; this is checked whenever the quantity is assigned.
///
/// `spec_name` and `filter_name` disambiguate several measurements of the same
/// metric registered in one [`Job`].
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    metric: Arc<Metric>,
    quantity: Option<Quantity>,
    identifier: Option<String>,
    spec_name: Option<String>,
    filter_name: Option<String>,
    parameters: DatumSet,
    extras: DatumSet,
    blobs: BTreeMap<String, Arc<Blob>>,
    notes: BTreeMap<String, serde_json::Value>,
}

impl Measurement {
    pub fn new(metric: impl Into<Arc<Metric>>) -> Self {
        Self {
            metric: metric.into(),
            quantity: None,
            identifier: None,
            spec_name: None,
            filter_name: None,
            parameters: DatumSet::new(),
            extras: DatumSet::new(),
            blobs: BTreeMap::new(),
            notes: BTreeMap::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: Quantity) -> Result<Self> {
        self.set_quantity(Some(quantity))?;
        Ok(self)
    }

    pub fn with_spec_name(mut self, spec_name: impl Into<String>) -> Self {
        self.spec_name = Some(spec_name.into());
        self
    }

    pub fn with_filter_name(mut self, filter_name: impl Into<String>) -> Self {
        self.filter_name = Some(filter_name.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn metric(&self) -> &Arc<Metric> {
        &self.metric
    }

    pub fn metric_name(&self) -> &str {
        self.metric.name()
    }

    /// Stable key; defaults to the metric name joined with the spec level and
    /// filter, e.g. `PF1.design.r`.
    pub fn identifier(&self) -> String {
        if let Some(id) = &self.identifier {
            return id.clone();
        }
        let mut parts = vec![self.metric.name()];
        parts.extend(self.spec_name.as_deref());
        parts.extend(self.filter_name.as_deref());
        parts.join(".")
    }

    pub fn spec_name(&self) -> Option<&str> {
        self.spec_name.as_deref()
    }

    pub fn filter_name(&self) -> Option<&str> {
        self.filter_name.as_deref()
    }

    pub fn quantity(&self) -> Option<&Quantity> {
        self.quantity.as_ref()
    }

    pub fn is_measured(&self) -> bool {
        self.quantity.is_some()
    }

    /// Assign the measured quantity, or `None` for "not measured".
    pub fn set_quantity(&mut self, quantity: Option<Quantity>) -> Result<()> {
        self.set_quantity_in(units::standard(), quantity)
    }

    pub fn set_quantity_in(&mut self, system: &dyn UnitSystem, quantity: Option<Quantity>) -> Result<()> {
        if let Some(q) = &quantity {
            if !system.compatible(&q.unit, self.metric.unit())? {
                return Err(VerifyError::IncompatibleUnits {
                    from: q.unit.clone(),
                    to: self.metric.unit().to_string(),
                });
            }
        }
        self.quantity = quantity;
        Ok(())
    }

    /// Value and unit form of [`Measurement::set_quantity`].
    pub fn set_value(&mut self, value: Option<f64>, unit: &str) -> Result<()> {
        let quantity = value.map(|v| Quantity::new(v, unit)).transpose()?;
        self.set_quantity(quantity)
    }

    // -- parameters and extras ----------------------------------------------

    /// Register an input parameter. Re-registering a name replaces it.
    pub fn register_parameter(&mut self, name: &str, registration: Registration) -> Result<()> {
        self.parameters.register(name, registration)
    }

    /// Register an auxiliary output. Re-registering a name replaces it.
    pub fn register_extra(&mut self, name: &str, registration: Registration) -> Result<()> {
        self.extras.register(name, registration)
    }

    pub fn parameter(&self, name: &str) -> Option<&Datum> {
        self.parameters.get(name)
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<DatumValue>) -> Result<()> {
        let owner = format!("measurement {} parameters", self.identifier());
        self.parameters
            .set_value(name, value)
            .map_err(|e| e.with_owner(&owner))
    }

    pub fn extra(&self, name: &str) -> Option<&Datum> {
        self.extras.get(name)
    }

    pub fn set_extra(&mut self, name: &str, value: impl Into<DatumValue>) -> Result<()> {
        let owner = format!("measurement {} extras", self.identifier());
        self.extras
            .set_value(name, value)
            .map_err(|e| e.with_owner(&owner))
    }

    pub fn parameters(&self) -> &DatumSet {
        &self.parameters
    }

    pub fn extras(&self) -> &DatumSet {
        &self.extras
    }

    // -- blobs and notes ----------------------------------------------------

    pub fn link_blob(&mut self, local_name: impl Into<String>, blob: Arc<Blob>) {
        self.blobs.insert(local_name.into(), blob);
    }

    pub fn blob(&self, local_name: &str) -> Option<&Arc<Blob>> {
        self.blobs.get(local_name)
    }

    pub fn blobs(&self) -> &BTreeMap<String, Arc<Blob>> {
        &self.blobs
    }

    pub fn add_note(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.notes.insert(key.into(), value.into());
    }

    pub fn notes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.notes
    }

    // -- evaluation and registration ----------------------------------------

    /// Compare with the `level` specification for this measurement's filter.
    ///
    /// Returns `Ok(None)` when nothing was measured.
    pub fn check_spec(&self, level: &str) -> Result<Option<bool>> {
        self.quantity
            .as_ref()
            .map(|q| self.metric.check(q, level, self.filter_name.as_deref()))
            .transpose()
    }

    /// Add this measurement to `job`.
    pub fn register(self, job: &mut Job) -> Result<()> {
        job.register_measurement(self)
    }

    pub(crate) fn set_metric(&mut self, metric: Arc<Metric>) {
        self.metric = metric;
    }

    pub(crate) fn blobs_mut(&mut self) -> impl Iterator<Item = &mut Arc<Blob>> {
        self.blobs.values_mut()
    }

    pub(crate) fn to_record(&self) -> MeasurementRecord {
        MeasurementRecord {
            identifier: self.identifier(),
            metric: self.metric.name().to_string(),
            value: self.quantity.as_ref().map(|q| q.value),
            unit: self
                .quantity
                .as_ref()
                .map_or_else(|| self.metric.unit().to_string(), |q| q.unit.clone()),
            parameters: self.parameters.clone(),
            extras: self.extras.clone(),
            blobs: self
                .blobs
                .iter()
                .map(|(local, blob)| (local.clone(), blob.identifier().to_string()))
                .collect(),
            spec_name: self.spec_name.clone(),
            filter_name: self.filter_name.clone(),
            notes: self.notes.clone(),
        }
    }

    /// Rebuild from a document record, linking blobs through `lookup`.
    pub(crate) fn from_record(
        record: MeasurementRecord,
        metric: Arc<Metric>,
        lookup: impl Fn(&str) -> Result<Arc<Blob>>,
    ) -> Result<Self> {
        let mut m = Measurement::new(metric);
        m.spec_name = record.spec_name;
        m.filter_name = record.filter_name;
        if record.identifier != m.identifier() {
            m.identifier = Some(record.identifier);
        }
        m.set_value(record.value, &record.unit)?;
        m.parameters = record.parameters;
        m.extras = record.extras;
        m.notes = record.notes;
        for (local, id) in record.blobs {
            m.blobs.insert(local, lookup(&id)?);
        }
        Ok(m)
    }
}

/// Wire form of a measurement inside a job document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MeasurementRecord {
    pub identifier: String,
    pub metric: String,
    #[serde(default, with = "float_repr::option")]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub parameters: DatumSet,
    #[serde(default)]
    pub extras: DatumSet,
    #[serde(default)]
    pub blobs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notes: BTreeMap<String, serde_json::Value>,
}
