//! Named datum registries.
//!
//! Measurement parameters, measurement extras and blob contents are all
//! [`DatumSet`]s: a name → [`Datum`] mapping with explicit accessors for the
//! value of each registered entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::datum::{Datum, DatumValue};
use crate::domain::error::{Result, VerifyError};

/// Where a registered datum takes its value from.
#[derive(Debug, Clone, PartialEq)]
enum ValueSource {
    Empty,
    Value(DatumValue),
    Datum(Datum),
}

/// Arguments for [`DatumSet::register`].
///
/// A registration has exactly one value source: nothing (the value is set
/// later), a bare value, or an existing [`Datum`] whose unit, label and
/// description act as defaults. Explicit `unit`, `label` and `description`
/// override those defaults; the label falls back to the registered name.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    source: ValueSource,
    unit: Option<String>,
    label: Option<String>,
    description: Option<String>,
}

impl Registration {
    /// Register the name with no value yet.
    pub fn empty() -> Self {
        Self {
            source: ValueSource::Empty,
            unit: None,
            label: None,
            description: None,
        }
    }

    pub fn value(value: impl Into<DatumValue>) -> Self {
        Self {
            source: ValueSource::Value(value.into()),
            ..Self::empty()
        }
    }

    pub fn datum(datum: Datum) -> Self {
        Self {
            source: ValueSource::Datum(datum),
            ..Self::empty()
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn into_datum(self, name: &str) -> Result<Datum> {
        let mut datum = match self.source {
            ValueSource::Empty => Datum::empty(self.unit.as_deref().unwrap_or(""))?,
            ValueSource::Value(v) => Datum::new(v, self.unit.as_deref().unwrap_or(""))?,
            ValueSource::Datum(mut d) => {
                if let Some(unit) = self.unit.as_deref() {
                    d.set_unit(unit)?;
                }
                d
            }
        };

        if self.label.is_some() {
            datum.set_label(self.label);
        } else if datum.label().is_none() {
            datum.set_label(Some(name.to_string()));
        }
        if self.description.is_some() {
            datum.set_description(self.description);
        }
        Ok(datum)
    }
}

/// A name → [`Datum`] registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatumSet {
    datums: BTreeMap<String, Datum>,
}

impl DatumSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) `name`.
    ///
    /// Registering a name that already exists replaces the previous datum.
    pub fn register(&mut self, name: &str, registration: Registration) -> Result<()> {
        let datum = registration.into_datum(name)?;
        if self.datums.insert(name.to_string(), datum).is_some() {
            tracing::debug!(datum = %name, "datum re-registered, previous value replaced");
        }
        Ok(())
    }

    /// Insert a fully built datum as-is.
    pub fn insert(&mut self, name: &str, datum: Datum) {
        self.datums.insert(name.to_string(), datum);
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.datums.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Datum> {
        self.datums.get_mut(name)
    }

    /// Value of a registered datum; `Ok(None)` when registered without a value.
    pub fn value(&self, name: &str) -> Result<Option<&DatumValue>> {
        self.datums
            .get(name)
            .map(Datum::value)
            .ok_or_else(|| unknown(name))
    }

    /// Update the value of a registered datum, keeping its unit and label.
    pub fn set_value(&mut self, name: &str, value: impl Into<DatumValue>) -> Result<()> {
        let datum = self.datums.get_mut(name).ok_or_else(|| unknown(name))?;
        datum.set_value(value);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datums.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datums.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.datums.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.datums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datums.is_empty()
    }
}

fn unknown(name: &str) -> VerifyError {
    VerifyError::UnknownDatum {
        owner: "datum set".to_string(),
        name: name.to_string(),
    }
}
