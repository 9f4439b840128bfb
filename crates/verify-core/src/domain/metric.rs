//! Metric definitions and the comparison engine.
//!
//! A [`Metric`] names a measured quantity, its unit, a comparison
//! [`Operator`] and one or more [`Specification`] levels. Measured values are
//! always placed on the left of the operator and the specification threshold
//! on the right.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::definitions::MetricSet;
use crate::domain::datum::{Datum, DatumValue, Quantity};
use crate::domain::datum_set::{DatumSet, Registration};
use crate::domain::error::{Result, VerifyError};
use crate::domain::spec::{self, Dependency, SpecDefinition, Specification};
use crate::units::{self, UnitSystem};

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Binary comparison between a measured value and a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::GreaterEqual => ">=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
        }
    }

    /// Evaluate `measured <op> threshold`.
    ///
    /// `Equal` and `NotEqual` compare exactly, with no floating-point
    /// tolerance. Callers that need one must round before checking.
    #[allow(clippy::float_cmp)]
    pub fn apply(self, measured: f64, threshold: f64) -> bool {
        match self {
            Operator::GreaterEqual => measured >= threshold,
            Operator::Greater => measured > threshold,
            Operator::Less => measured < threshold,
            Operator::LessEqual => measured <= threshold,
            Operator::Equal => measured == threshold,
            Operator::NotEqual => measured != threshold,
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            ">=" => Ok(Operator::GreaterEqual),
            ">" => Ok(Operator::Greater),
            "<" => Ok(Operator::Less),
            "<=" => Ok(Operator::LessEqual),
            "==" => Ok(Operator::Equal),
            "!=" => Ok(Operator::NotEqual),
            other => Err(format!("unknown operator {other:?}")),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// Where a metric is defined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.doc, self.page) {
            (Some(doc), Some(page)) => write!(f, "{doc}, p. {page}")?,
            (Some(doc), None) => f.write_str(doc)?,
            (None, _) => {}
        }
        match (&self.doc, &self.url) {
            (Some(_), Some(url)) => write!(f, ", {url}"),
            (None, Some(url)) => f.write_str(url),
            (_, None) => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// A named metric with its specification levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    description: String,
    reference: Option<Reference>,
    unit: String,
    operator: Operator,
    parameters: DatumSet,
    specs: Vec<Specification>,
}

impl Metric {
    /// Build a metric programmatically.
    ///
    /// The metric unit is the unit of the first specification; use
    /// [`Metric::with_unit`] to override it.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        operator: Operator,
        specs: Vec<Specification>,
    ) -> Result<Self> {
        let name = name.into();
        let unit = specs
            .first()
            .map(|s| s.unit().to_string())
            .ok_or_else(|| VerifyError::malformed(&name, "no specifications"))?;
        spec::check_unique(&name, &specs)?;
        let metric = Self {
            name,
            description: description.into(),
            reference: None,
            unit,
            operator,
            parameters: DatumSet::new(),
            specs,
        };
        metric.check_spec_units()?;
        Ok(metric)
    }

    /// Override the metric unit; every specification unit must convert to it.
    pub fn with_unit(mut self, unit: &str) -> Result<Self> {
        units::standard()
            .validate(unit)
            .map_err(|e| VerifyError::malformed(&self.name, e.to_string()))?;
        self.unit = unit.to_string();
        self.check_spec_units()?;
        Ok(self)
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_parameter(mut self, name: &str, registration: Registration) -> Result<Self> {
        self.parameters.register(name, registration)?;
        Ok(self)
    }

    /// Parse the entry `name` out of a mapping of metric definitions.
    ///
    /// Metric-reference dependencies naming another entry of `document` carry
    /// that entry's definition. References that close a cycle, or name a
    /// metric the document lacks, stay bare names.
    pub fn from_definition(name: &str, document: &serde_json::Value) -> Result<Self> {
        Self::load(name, document, &mut Vec::new())
    }

    fn load(name: &str, document: &serde_json::Value, loading: &mut Vec<String>) -> Result<Self> {
        let entry = document
            .get(name)
            .ok_or_else(|| VerifyError::MetricNotFound(name.to_string()))?;
        let mut metric = Self::from_entry(name, entry)?;

        loading.push(name.to_string());
        for spec in &mut metric.specs {
            for dependency in spec.dependencies_mut() {
                let Dependency::Metric(reference) = dependency else {
                    continue;
                };
                let other = reference.name();
                if document.get(other).is_none() || loading.iter().any(|n| n == other) {
                    continue;
                }
                let referenced = Self::load(other, document, loading)?;
                *reference = reference.clone().with_definition(referenced);
            }
        }
        loading.pop();
        Ok(metric)
    }

    /// Parse a single definition body.
    fn from_entry(name: &str, entry: &serde_json::Value) -> Result<Self> {
        let def = MetricDefinition::deserialize(entry)
            .map_err(|e| VerifyError::malformed(name, e.to_string()))?;
        let operator = def
            .operator
            .as_deref()
            .ok_or_else(|| VerifyError::malformed(name, "missing operator"))?
            .parse::<Operator>()
            .map_err(|reason| VerifyError::malformed(name, reason))?;
        if def.specs.is_empty() {
            return Err(VerifyError::malformed(name, "no specifications"));
        }
        let specs = def
            .specs
            .into_iter()
            .map(|s| Specification::from_definition(name, s))
            .collect::<Result<Vec<_>>>()?;

        let mut metric = Metric::new(name, def.description.unwrap_or_default(), operator, specs)?;
        if let Some(unit) = def.unit.as_deref() {
            metric = metric.with_unit(unit)?;
        }
        metric.reference = def.reference;
        metric.parameters = def.parameters;
        Ok(metric)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    /// Human-readable reference, `"<doc>, p. <page>, <url>"` with absent parts
    /// left out.
    pub fn reference_string(&self) -> String {
        self.reference
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn specs(&self) -> &[Specification] {
        &self.specs
    }

    /// Definitions carried by this metric's metric-reference dependencies.
    pub fn referenced_definitions(&self) -> Vec<&Arc<Metric>> {
        self.specs
            .iter()
            .flat_map(|s| s.dependencies().values())
            .filter_map(|d| match d {
                Dependency::Metric(reference) => reference.definition(),
                Dependency::Datum(_) => None,
            })
            .collect()
    }

    pub fn parameters(&self) -> &DatumSet {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Datum> {
        self.parameters.get(name)
    }

    /// Update a parameter value; the only mutation a built metric allows.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<DatumValue>) -> Result<()> {
        let owner = format!("metric {}", self.name);
        self.parameters
            .set_value(name, value)
            .map_err(|e| e.with_owner(&owner))
    }

    /// The specification for `level` that applies to `filter_name`.
    pub fn get_spec(&self, level: &str, filter_name: Option<&str>) -> Result<&Specification> {
        spec::resolve(&self.specs, &self.name, level, filter_name)
    }

    /// Sorted level names applicable to `filter_name` (all levels when `None`).
    pub fn spec_names(&self, filter_name: Option<&str>) -> Vec<String> {
        let mut names: Vec<String> = self
            .specs
            .iter()
            .filter(|s| filter_name.map_or(true, |f| s.applies_to(f)))
            .map(|s| s.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Evaluate a measured quantity against the `level` specification.
    pub fn check(&self, measured: &Quantity, level: &str, filter_name: Option<&str>) -> Result<bool> {
        self.check_in(units::standard(), measured, level, filter_name)
    }

    pub fn check_in(
        &self,
        system: &dyn UnitSystem,
        measured: &Quantity,
        level: &str,
        filter_name: Option<&str>,
    ) -> Result<bool> {
        let spec = self.get_spec(level, filter_name)?;
        let value = system.convert(measured.value, &measured.unit, spec.unit())?;
        let passed = self.operator.apply(value, spec.value());
        crate::obs::emit_spec_checked(&self.name, level, filter_name, passed);
        Ok(passed)
    }

    /// Evaluate a bare value expressed in the metric unit.
    pub fn check_value(&self, value: f64, level: &str, filter_name: Option<&str>) -> Result<bool> {
        let measured = Quantity {
            value,
            unit: self.unit.clone(),
        };
        self.check(&measured, level, filter_name)
    }

    /// Resolve the dependency `name` of the `level` specification.
    pub fn dependency(
        &self,
        level: &str,
        filter_name: Option<&str>,
        name: &str,
        metrics: &MetricSet,
    ) -> Result<Datum> {
        self.get_spec(level, filter_name)?
            .dependency(&self.name, name, filter_name, metrics)
    }

    /// The definition written into job documents. Metric-reference
    /// dependencies are kept by name and must all be defined in `metrics`.
    pub fn to_definition(&self, metrics: &MetricSet) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.definition(metrics)?)?)
    }

    pub(crate) fn definition(&self, metrics: &MetricSet) -> Result<MetricDefinition> {
        let specs = self
            .specs
            .iter()
            .map(|s| s.to_definition(&self.name, metrics))
            .collect::<Result<Vec<_>>>()?;
        Ok(MetricDefinition {
            description: Some(self.description.clone()),
            operator: Some(self.operator.symbol().to_string()),
            unit: Some(self.unit.clone()),
            reference: self.reference.clone(),
            parameters: self.parameters.clone(),
            specs,
        })
    }

    fn check_spec_units(&self) -> Result<()> {
        let system = units::standard();
        for s in &self.specs {
            let compatible = system
                .compatible(s.unit(), &self.unit)
                .map_err(|e| VerifyError::malformed(&self.name, e.to_string()))?;
            if !compatible {
                return Err(VerifyError::malformed(
                    &self.name,
                    format!(
                        "{} specification unit {:?} is not convertible to {:?}",
                        s.name(),
                        s.unit(),
                        self.unit
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Wire form of one metric definition (YAML definitions and job documents).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct MetricDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "DatumSet::is_empty")]
    pub parameters: DatumSet,
    #[serde(default)]
    pub specs: Vec<SpecDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn am1_document() -> serde_json::Value {
        json!({
            "AM1": {
                "description": "RMS of distance distribution for stars separated by 5 arcmin",
                "operator": "<=",
                "reference": {"doc": "LPM-17", "page": 23, "url": "http://ls.st/lpm-17"},
                "parameters": {"D": {"value": 5.0, "unit": "arcmin", "label": "D"}},
                "specs": [
                    {"level": "design", "value": 10.0, "unit": "mmag", "filter_names": ["r", "i"]},
                    {"level": "design", "value": 20.0, "unit": "mmag", "filter_names": ["u", "z", "y"]},
                    {"level": "minimum", "value": 20.0, "unit": "mmag"}
                ]
            }
        })
    }

    fn am1() -> Metric {
        Metric::from_definition("AM1", &am1_document()).expect("AM1")
    }

    #[test]
    fn test_from_definition() {
        let m = am1();
        assert_eq!(m.name(), "AM1");
        assert_eq!(m.operator(), Operator::LessEqual);
        assert_eq!(m.unit(), "mmag");
        assert_eq!(m.specs().len(), 3);
        assert_eq!(
            m.parameter("D").and_then(Datum::value),
            Some(&DatumValue::Float(5.0))
        );
    }

    #[test]
    fn test_am1_scenario() {
        let m = am1();
        let passing = Quantity::new(8.5, "mmag").expect("quantity");
        let failing = Quantity::new(12.0, "mmag").expect("quantity");
        assert!(m.check(&passing, "design", Some("r")).expect("check"));
        assert!(!m.check(&failing, "design", Some("r")).expect("check"));
        assert!(m.check_value(8.5, "design", Some("r")).expect("check"));
    }

    #[test]
    fn test_check_converts_units() {
        let m = am1();
        let in_mag = Quantity::new(0.0085, "mag").expect("quantity");
        assert!(m.check(&in_mag, "design", Some("i")).expect("check"));
        let in_mag = Quantity::new(0.015, "mag").expect("quantity");
        assert!(!m.check(&in_mag, "design", Some("i")).expect("check"));
        assert!(m.check(&in_mag, "design", Some("z")).expect("check"));
    }

    #[test]
    fn test_check_incompatible_units() {
        let m = am1();
        let q = Quantity::new(1.0, "arcsec").expect("quantity");
        let err = m.check(&q, "design", Some("r")).unwrap_err();
        assert!(matches!(err, VerifyError::IncompatibleUnits { .. }));
    }

    #[test]
    fn test_operators() {
        let cases = [
            (Operator::LessEqual, 9.0, true),
            (Operator::LessEqual, 10.0, true),
            (Operator::LessEqual, 11.0, false),
            (Operator::Less, 10.0, false),
            (Operator::GreaterEqual, 9.0, false),
            (Operator::GreaterEqual, 11.0, true),
            (Operator::Greater, 10.0, false),
            (Operator::Equal, 10.0, true),
            (Operator::Equal, 10.000000001, false),
            (Operator::NotEqual, 10.0, false),
        ];
        for (op, measured, expected) in cases {
            assert_eq!(op.apply(measured, 10.0), expected, "{measured} {op} 10");
        }
    }

    #[test]
    fn test_operator_parse() {
        for sym in [">=", ">", "<", "<=", "==", "!="] {
            let op: Operator = sym.parse().expect("operator");
            assert_eq!(op.symbol(), sym);
        }
        assert!("=>".parse::<Operator>().is_err());
    }

    #[test]
    fn test_spec_names() {
        let m = am1();
        assert_eq!(m.spec_names(None), vec!["design", "minimum"]);
        assert_eq!(m.spec_names(Some("r")), vec!["design", "minimum"]);
        assert_eq!(m.spec_names(Some("g")), vec!["minimum"]);
    }

    #[test]
    fn test_reference_string() {
        assert_eq!(am1().reference_string(), "LPM-17, p. 23, http://ls.st/lpm-17");

        let url_only = Reference {
            url: Some("http://example.org".to_string()),
            ..Reference::default()
        };
        assert_eq!(url_only.to_string(), "http://example.org");

        let doc_only = Reference {
            doc: Some("LPM-17".to_string()),
            ..Reference::default()
        };
        assert_eq!(doc_only.to_string(), "LPM-17");
    }

    #[test]
    fn test_metric_not_found() {
        let err = Metric::from_definition("PA1", &am1_document()).unwrap_err();
        assert!(matches!(err, VerifyError::MetricNotFound(ref n) if n == "PA1"));
    }

    #[test]
    fn test_malformed_definitions() {
        let cases = [
            json!({"X": {"specs": [{"level": "design", "value": 1.0, "unit": ""}]}}),
            json!({"X": {"operator": "=<", "specs": [{"level": "design", "value": 1.0, "unit": ""}]}}),
            json!({"X": {"operator": "<="}}),
            json!({"X": {"operator": "<=", "specs": []}}),
            json!({"X": {"operator": "<=", "specs": [{"value": 1.0, "unit": ""}]}}),
            json!({"X": {"operator": "<=", "specs": [{"level": "design", "value": 1.0, "unit": "millimag"}]}}),
            json!({"X": {"operator": "<=", "unit": "arcsec", "specs": [{"level": "design", "value": 1.0, "unit": "mag"}]}}),
            json!({"X": {"operator": "<=", "specs": [
                {"level": "design", "value": 1.0, "unit": ""},
                {"level": "design", "value": 2.0, "unit": ""}
            ]}}),
        ];
        for doc in cases {
            let err = Metric::from_definition("X", &doc).unwrap_err();
            assert!(
                matches!(err, VerifyError::MalformedMetric { .. }),
                "{doc}: {err}"
            );
        }
    }

    #[test]
    fn test_explicit_metric_unit() {
        let doc = json!({
            "PA1": {
                "operator": "<=",
                "unit": "mmag",
                "specs": [{"level": "design", "value": 0.005, "unit": "mag"}]
            }
        });
        let m = Metric::from_definition("PA1", &doc).expect("PA1");
        assert_eq!(m.unit(), "mmag");
        assert!(m.check_value(4.0, "design", None).expect("check"));
        assert!(!m.check_value(6.0, "design", None).expect("check"));
    }

    #[test]
    fn test_set_parameter() {
        let mut m = am1();
        m.set_parameter("D", 10.0).expect("known parameter");
        assert_eq!(
            m.parameter("D").and_then(Datum::value),
            Some(&DatumValue::Float(10.0))
        );
        assert!(matches!(
            m.set_parameter("Q", 1.0).unwrap_err(),
            VerifyError::UnknownDatum { .. }
        ));
    }

    #[test]
    fn test_definition_roundtrip() {
        let m = am1();
        let metrics = MetricSet::new();
        let doc = json!({"AM1": m.to_definition(&metrics).expect("definition")});
        assert_eq!(Metric::from_definition("AM1", &doc).expect("AM1"), m);
    }

    #[test]
    fn test_references_carry_definitions_from_document() {
        let doc = json!({
            "PA2": {"operator": "<=", "specs": [
                {"level": "design", "value": 15.0, "unit": "mmag", "filter_names": ["r"]},
                {"level": "design", "value": 25.0, "unit": "mmag", "filter_names": ["i"]}
            ]},
            "PF1": {"operator": "<=", "specs": [
                {"level": "design", "value": 10.0, "unit": "%", "filter_names": ["r", "i"],
                 "dependencies": ["PA2"]}
            ]}
        });
        let pf1 = Metric::from_definition("PF1", &doc).expect("PF1");
        let carried: Vec<&str> = pf1.referenced_definitions().iter().map(|m| m.name()).collect();
        assert_eq!(carried, vec!["PA2"]);

        let alone = MetricSet::new();
        let i = pf1.dependency("design", Some("i"), "PA2", &alone).expect("i band");
        assert_eq!(i.quantity(), Some(Quantity::new(25.0, "mmag").expect("quantity")));
        let r = pf1.dependency("design", Some("r"), "PA2", &alone).expect("r band");
        assert_eq!(r.quantity(), Some(Quantity::new(15.0, "mmag").expect("quantity")));
    }

    #[test]
    fn test_reference_cycles_stay_bare() {
        let doc = json!({
            "A": {"operator": "<=", "specs": [
                {"level": "design", "value": 1.0, "unit": "", "dependencies": ["B"]}
            ]},
            "B": {"operator": "<=", "specs": [
                {"level": "design", "value": 2.0, "unit": "", "dependencies": ["A", "C"]}
            ]}
        });
        let a = Metric::from_definition("A", &doc).expect("A");
        let b = &a.referenced_definitions()[0];
        assert_eq!(b.name(), "B");
        assert!(b.referenced_definitions().is_empty());
        assert!(matches!(
            b.specs()[0].dependencies().get("C"),
            Some(Dependency::Metric(r)) if r.definition().is_none()
        ));
    }

    #[test]
    fn test_literal_dependency_with_bad_unit() {
        let doc = json!({
            "PF1": {"operator": "<=", "specs": [
                {"level": "design", "value": 10.0, "unit": "%",
                 "dependencies": {"AF1": {"value": 0.1, "unit": "millimag"}}}
            ]}
        });
        let err = Metric::from_definition("PF1", &doc).unwrap_err();
        assert!(matches!(err, VerifyError::MalformedMetric { .. }), "{err}");
        let message = err.to_string();
        assert!(message.contains("dependency AF1"), "{message}");
        assert!(message.contains("millimag"), "{message}");
    }
}
