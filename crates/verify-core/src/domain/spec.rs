//! Specification levels and their resolution rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::definitions::MetricSet;
use crate::domain::datum::Datum;
use crate::domain::error::{Result, VerifyError};
use crate::domain::metric::Metric;
use crate::units::{self, UnitSystem};

/// A named dependency of a specification.
///
/// Either a literal datum or a reference to another metric whose
/// specification at the same level and filter supplies the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dependency {
    Metric(MetricRef),
    Datum(Datum),
}

impl Dependency {
    /// Reference the metric `name` without carrying its definition.
    pub fn metric(name: impl Into<String>) -> Self {
        Dependency::Metric(MetricRef::new(name))
    }

    /// Parse one declared dependency: a string names a metric, anything else
    /// must be a datum.
    fn from_value(metric: &str, name: &str, value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(other) => Ok(Dependency::metric(other)),
            value => Datum::from_json(&value)
                .map(Dependency::Datum)
                .map_err(|e| VerifyError::malformed(metric, format!("dependency {name}: {e}"))),
        }
    }
}

/// Reference to another metric by name.
///
/// Metrics loaded from a definitions document carry the referenced
/// definition from the same document, so the reference still resolves when
/// the referencing metric travels alone. Equality only looks at the name.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "String")]
pub struct MetricRef {
    name: String,
    definition: Option<Arc<Metric>>,
}

impl MetricRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: None,
        }
    }

    pub fn with_definition(mut self, metric: impl Into<Arc<Metric>>) -> Self {
        self.definition = Some(metric.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The referenced definition, when one was loaded alongside.
    pub fn definition(&self) -> Option<&Arc<Metric>> {
        self.definition.as_ref()
    }
}

impl PartialEq for MetricRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl From<MetricRef> for String {
    fn from(reference: MetricRef) -> Self {
        reference.name
    }
}

/// One threshold level of a metric, optionally restricted to some filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    name: String,
    value: f64,
    unit: String,
    filter_names: Vec<String>,
    dependencies: BTreeMap<String, Dependency>,
}

impl Specification {
    /// Build a filter-agnostic specification. `unit` is validated.
    pub fn new(name: impl Into<String>, value: f64, unit: &str) -> Result<Self> {
        units::standard().validate(unit)?;
        Ok(Self {
            name: name.into(),
            value,
            unit: unit.to_string(),
            filter_names: Vec::new(),
            dependencies: BTreeMap::new(),
        })
    }

    /// Restrict the specification to the given filters (duplicates dropped).
    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for f in filters {
            let f = f.into();
            if !self.filter_names.contains(&f) {
                self.filter_names.push(f);
            }
        }
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>, dependency: Dependency) -> Self {
        self.dependencies.insert(name.into(), dependency);
        self
    }

    /// Level name, e.g. `design`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn filter_names(&self) -> &[String] {
        &self.filter_names
    }

    pub fn dependencies(&self) -> &BTreeMap<String, Dependency> {
        &self.dependencies
    }

    pub(crate) fn dependencies_mut(&mut self) -> impl Iterator<Item = &mut Dependency> {
        self.dependencies.values_mut()
    }

    pub fn is_filter_agnostic(&self) -> bool {
        self.filter_names.is_empty()
    }

    /// Whether this specification lists `filter`, or applies to every filter.
    pub fn applies_to(&self, filter: &str) -> bool {
        self.is_filter_agnostic() || self.filter_names.iter().any(|f| f == filter)
    }

    /// The threshold as a datum labelled with the level name.
    pub fn datum(&self) -> Datum {
        Datum::from_parts(Some(self.value.into()), self.unit.clone()).with_label(self.name.clone())
    }

    /// Resolve the dependency `name` into a datum.
    ///
    /// A metric reference looks up the referenced metric's specification at
    /// the same level and for `filter_name`. Without a filter, a
    /// specification restricted to exactly one filter uses that filter; the
    /// lookup is otherwise left unfiltered. The referenced metric is taken
    /// from `metrics`, falling back to the definition the reference carries.
    pub fn dependency(
        &self,
        metric: &str,
        name: &str,
        filter_name: Option<&str>,
        metrics: &MetricSet,
    ) -> Result<Datum> {
        let fail = |reason: String| VerifyError::DependencyResolution {
            metric: metric.to_string(),
            level: self.name.clone(),
            dependency: name.to_string(),
            reason,
        };

        let reference = match self.dependencies.get(name) {
            Some(Dependency::Datum(d)) => return Ok(d.clone()),
            Some(Dependency::Metric(reference)) => reference,
            None => return Err(fail("not a declared dependency".to_string())),
        };

        let filter = match (filter_name, self.filter_names.as_slice()) {
            (Some(filter), _) => Some(filter),
            (None, [only]) => Some(only.as_str()),
            (None, _) => None,
        };

        let other = metrics
            .get(reference.name())
            .or(reference.definition())
            .ok_or_else(|| fail(format!("metric {} is not defined", reference.name())))?;
        let spec = other
            .get_spec(&self.name, filter)
            .map_err(|e| fail(e.to_string()))?;

        let mut datum = spec.datum().with_label(reference.name().to_string());
        if !other.description().is_empty() {
            datum.set_description(Some(other.description().to_string()));
        }
        Ok(datum)
    }

    pub(crate) fn from_definition(metric: &str, def: SpecDefinition) -> Result<Self> {
        let name = def
            .level
            .ok_or_else(|| VerifyError::malformed(metric, "specification without level"))?;
        let value = def.value.ok_or_else(|| {
            VerifyError::malformed(metric, format!("{name} specification without value"))
        })?;
        let unit = def.unit.ok_or_else(|| {
            VerifyError::malformed(metric, format!("{name} specification without unit"))
        })?;
        let spec = Specification::new(name, value, &unit)
            .map_err(|e| VerifyError::malformed(metric, e.to_string()))?
            .with_filters(def.filter_names);

        let mut declared = Vec::new();
        match def.dependencies {
            None => {}
            Some(DependencyDecl::Map(map)) => declared.extend(map),
            Some(DependencyDecl::List(entries)) => {
                for entry in entries {
                    match entry {
                        DependencyEntry::Metric(other) => {
                            declared.push((other.clone(), serde_json::Value::String(other)));
                        }
                        DependencyEntry::Named(map) => declared.extend(map),
                    }
                }
            }
        }
        let dependencies = declared
            .into_iter()
            .map(|(name, value)| {
                let dependency = Dependency::from_value(metric, &name, value)?;
                Ok((name, dependency))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            dependencies,
            ..spec
        })
    }

    /// Definition form. Metric references are written by name; every one of
    /// them must be defined in `metrics` so the written form stays resolvable.
    pub(crate) fn to_definition(&self, metric: &str, metrics: &MetricSet) -> Result<SpecDefinition> {
        let mut declared = BTreeMap::new();
        for (name, dependency) in &self.dependencies {
            if let Dependency::Metric(reference) = dependency {
                if !metrics.contains(reference.name()) {
                    return Err(VerifyError::DependencyResolution {
                        metric: metric.to_string(),
                        level: self.name.clone(),
                        dependency: name.clone(),
                        reason: format!("metric {} is not defined", reference.name()),
                    });
                }
            }
            declared.insert(name.clone(), serde_json::to_value(dependency)?);
        }
        Ok(SpecDefinition {
            level: Some(self.name.clone()),
            value: Some(self.value),
            unit: Some(self.unit.clone()),
            filter_names: self.filter_names.clone(),
            dependencies: (!declared.is_empty()).then_some(DependencyDecl::Map(declared)),
        })
    }
}

/// Select the single specification of `level` that applies to `filter_name`.
///
/// With a filter, a specification listing it wins, then the level's only
/// filter-agnostic specification. Without a filter, a lone candidate wins,
/// then the only filter-agnostic one.
pub fn resolve<'a>(
    specs: &'a [Specification],
    metric: &str,
    level: &str,
    filter_name: Option<&str>,
) -> Result<&'a Specification> {
    let candidates: Vec<&Specification> = specs.iter().filter(|s| s.name == level).collect();
    if candidates.is_empty() {
        return Err(VerifyError::SpecificationNotFound {
            metric: metric.to_string(),
            level: level.to_string(),
        });
    }

    let ambiguous = || VerifyError::AmbiguousSpecification {
        metric: metric.to_string(),
        level: level.to_string(),
        filter: filter_name.map(str::to_string),
    };

    if let Some(filter) = filter_name {
        let listed: Vec<&Specification> = candidates
            .iter()
            .copied()
            .filter(|s| s.filter_names.iter().any(|f| f == filter))
            .collect();
        match listed.as_slice() {
            [only] => return Ok(only),
            [] => {}
            _ => return Err(ambiguous()),
        }
    } else if let [only] = candidates.as_slice() {
        return Ok(only);
    }

    let agnostic: Vec<&Specification> = candidates
        .into_iter()
        .filter(|s| s.is_filter_agnostic())
        .collect();
    match (agnostic.as_slice(), filter_name) {
        ([only], _) => Ok(only),
        ([], Some(filter)) => Err(VerifyError::UnknownFilter {
            metric: metric.to_string(),
            level: level.to_string(),
            filter: filter.to_string(),
        }),
        _ => Err(ambiguous()),
    }
}

/// Check the (level, filter) uniqueness rule over a metric's specifications.
pub(crate) fn check_unique(metric: &str, specs: &[Specification]) -> Result<()> {
    for (i, spec) in specs.iter().enumerate() {
        for other in &specs[..i] {
            if other.name != spec.name {
                continue;
            }
            if spec.is_filter_agnostic() && other.is_filter_agnostic() {
                return Err(VerifyError::malformed(
                    metric,
                    format!("several filter-agnostic {} specifications", spec.name),
                ));
            }
            if let Some(f) = spec.filter_names.iter().find(|f| other.filter_names.contains(f)) {
                return Err(VerifyError::malformed(
                    metric,
                    format!("several {} specifications for filter {f}", spec.name),
                ));
            }
        }
    }
    Ok(())
}

/// Wire form of one entry of a metric's `specs` list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SpecDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, alias = "filters", skip_serializing_if = "Vec::is_empty")]
    pub filter_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyDecl>,
}

/// `dependencies:` is either a mapping or a list of metric names and
/// single-entry mappings. Values stay raw until
/// [`Specification::from_definition`] parses them, so a bad datum reports
/// its own error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum DependencyDecl {
    Map(BTreeMap<String, serde_json::Value>),
    List(Vec<DependencyEntry>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum DependencyEntry {
    Metric(String),
    Named(BTreeMap<String, serde_json::Value>),
}
