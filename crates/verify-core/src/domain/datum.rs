//! `Datum`: a value annotated with a unit, a label and a description.
//!
//! Datums are the atomic serializable unit of a job document. They back metric
//! parameters, specification dependencies, measurement parameters and extras,
//! and blob contents.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, VerifyError};
use crate::units::{self, UnitSystem};

/// Value carried by a [`Datum`].
///
/// Integers and floats are kept apart so that `5` and `5.0` survive a JSON
/// round trip unchanged. Non-finite floats are written as the strings
/// `"NaN"`, `"Infinity"` and `"-Infinity"` and read back as floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatumValue {
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Text(String),
    List(Vec<DatumValue>),
}

/// NaN equals NaN here, so a datum always equals its own round trip.
impl PartialEq for DatumValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DatumValue::Bool(a), DatumValue::Bool(b)) => a == b,
            (DatumValue::Int(a), DatumValue::Int(b)) => a == b,
            (DatumValue::Float(a), DatumValue::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (DatumValue::Text(a), DatumValue::Text(b)) => a == b,
            (DatumValue::List(a), DatumValue::List(b)) => a == b,
            _ => false,
        }
    }
}

/// JSON form of an `f64`: a number when finite, otherwise one of the strings
/// `"NaN"`, `"Infinity"` or `"-Infinity"`.
pub(crate) mod float_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(f64),
        Named(String),
    }

    fn from_wire<E: serde::de::Error>(wire: Wire) -> Result<f64, E> {
        match wire {
            Wire::Number(v) => Ok(v),
            Wire::Named(name) => match name.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(E::custom(format!("{name:?} is not a number"))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        from_wire(Wire::deserialize(deserializer)?)
    }

    /// The same encoding for optional values; `null` stays `None`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
            Option::<super::Wire>::deserialize(deserializer)?
                .map(super::from_wire)
                .transpose()
        }
    }
}

impl DatumValue {
    /// Numeric scalar view; `None` for booleans, text and lists.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatumValue::Int(i) => Some(*i as f64),
            DatumValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatumValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DatumValue]> {
        match self {
            DatumValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for DatumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatumValue::Bool(b) => write!(f, "{b}"),
            DatumValue::Int(i) => write!(f, "{i}"),
            DatumValue::Float(x) => write!(f, "{x}"),
            DatumValue::Text(s) => write!(f, "{s}"),
            DatumValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for DatumValue {
    fn from(v: bool) -> Self {
        DatumValue::Bool(v)
    }
}

impl From<i64> for DatumValue {
    fn from(v: i64) -> Self {
        DatumValue::Int(v)
    }
}

impl From<i32> for DatumValue {
    fn from(v: i32) -> Self {
        DatumValue::Int(i64::from(v))
    }
}

impl From<f64> for DatumValue {
    fn from(v: f64) -> Self {
        DatumValue::Float(v)
    }
}

impl From<&str> for DatumValue {
    fn from(v: &str) -> Self {
        DatumValue::Text(v.to_string())
    }
}

impl From<String> for DatumValue {
    fn from(v: String) -> Self {
        DatumValue::Text(v)
    }
}

impl<T: Into<DatumValue>> From<Vec<T>> for DatumValue {
    fn from(v: Vec<T>) -> Self {
        DatumValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// A scalar measured value with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(with = "float_repr")]
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    /// Create a quantity, validating `unit` against the standard unit system.
    pub fn new(value: f64, unit: &str) -> Result<Self> {
        Self::new_in(units::standard(), value, unit)
    }

    pub fn new_in(system: &dyn UnitSystem, value: f64, unit: &str) -> Result<Self> {
        system.validate(unit)?;
        Ok(Self {
            value,
            unit: unit.to_string(),
        })
    }

    /// Unitless quantity.
    pub fn dimensionless(value: f64) -> Self {
        Self {
            value,
            unit: String::new(),
        }
    }

    /// This quantity's value expressed in `unit`.
    pub fn value_in(&self, system: &dyn UnitSystem, unit: &str) -> Result<f64> {
        system.convert(self.value, &self.unit, unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

/// A value annotated with units, a plot label and a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDatum")]
pub struct Datum {
    value: Option<DatumValue>,
    unit: String,
    label: Option<String>,
    description: Option<String>,
}

/// Wire form of a datum before unit validation. Accepts the legacy `units` key.
#[derive(Deserialize)]
struct RawDatum {
    #[serde(default)]
    value: Option<DatumValue>,
    #[serde(default, alias = "units")]
    unit: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl TryFrom<RawDatum> for Datum {
    type Error = VerifyError;

    fn try_from(raw: RawDatum) -> Result<Self> {
        let mut datum = Datum::new_in(units::standard(), raw.value, &raw.unit.unwrap_or_default())?;
        datum.label = raw.label;
        datum.description = raw.description;
        Ok(datum)
    }
}

impl Datum {
    /// Create a datum with a value, validating `unit`.
    pub fn new(value: impl Into<DatumValue>, unit: &str) -> Result<Self> {
        Self::new_in(units::standard(), Some(value.into()), unit)
    }

    /// Create a datum whose value is not known yet.
    pub fn empty(unit: &str) -> Result<Self> {
        Self::new_in(units::standard(), None, unit)
    }

    /// Create a datum, validating `unit` with an injected unit system.
    pub fn new_in(system: &dyn UnitSystem, value: Option<DatumValue>, unit: &str) -> Result<Self> {
        system.validate(unit)?;
        Ok(Self {
            value,
            unit: unit.to_string(),
            label: None,
            description: None,
        })
    }

    /// Build from a unit that has already been validated.
    pub(crate) fn from_parts(value: Option<DatumValue>, unit: String) -> Self {
        Self {
            value,
            unit,
            label: None,
            description: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn value(&self) -> Option<&DatumValue> {
        self.value.as_ref()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_value(&mut self, value: impl Into<DatumValue>) {
        self.value = Some(value.into());
    }

    pub fn clear_value(&mut self) {
        self.value = None;
    }

    /// Replace the unit; the datum is left unchanged when `unit` is invalid.
    pub fn set_unit(&mut self, unit: &str) -> Result<()> {
        self.set_unit_in(units::standard(), unit)
    }

    pub fn set_unit_in(&mut self, system: &dyn UnitSystem, unit: &str) -> Result<()> {
        system.validate(unit)?;
        self.unit = unit.to_string();
        Ok(())
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    /// The value as a [`Quantity`] when it is a numeric scalar.
    pub fn quantity(&self) -> Option<Quantity> {
        let value = self.value.as_ref()?.as_f64()?;
        Some(Quantity {
            value,
            unit: self.unit.clone(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a Datum cannot fail: every field maps onto JSON directly.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Datum::try_from(RawDatum::deserialize(value)?)
    }
}
