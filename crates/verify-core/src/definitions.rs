//! Metric definition documents.
//!
//! Definitions are authored as YAML (or JSON) mappings of metric name to
//! definition and loaded into a [`MetricSet`], which is also the lookup table
//! for cross-metric specification dependencies.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::error::{Result, VerifyError};
use crate::domain::metric::Metric;
use crate::domain::spec::Dependency;

/// Name → [`Metric`] mapping, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    metrics: BTreeMap<String, Arc<Metric>>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every metric of a definitions document.
    pub fn from_document(document: &serde_json::Value) -> Result<Self> {
        let entries = document.as_object().ok_or_else(|| {
            VerifyError::UnsupportedFormat(
                "definitions must be a mapping of metric names to definitions".to_string(),
            )
        })?;
        let mut set = MetricSet::new();
        for name in entries.keys() {
            set.insert(Metric::from_definition(name, document)?)?;
        }
        Ok(set)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let document: serde_json::Value = serde_yaml::from_str(text)?;
        Self::from_document(&document)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(text)?;
        Self::from_document(&document)
    }

    /// Load a definitions file, choosing the parser from its extension.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)?;
        let set = match extension {
            "yml" | "yaml" => Self::from_yaml_str(&text)?,
            "json" => Self::from_json_str(&text)?,
            _ => return Err(VerifyError::UnsupportedFormat(path.display().to_string())),
        };
        tracing::debug!(path = %path.display(), metrics = set.len(), "loaded metric definitions");
        Ok(set)
    }

    /// Add a metric together with the definitions its metric references
    /// carry. Re-inserting an identical definition is a no-op; a conflicting
    /// one fails and leaves the set unchanged.
    pub fn insert(&mut self, metric: impl Into<Arc<Metric>>) -> Result<()> {
        let mut pending = Vec::new();
        collect_referenced(metric.into(), &mut pending);

        let mut staged: BTreeMap<String, Arc<Metric>> = BTreeMap::new();
        for metric in pending {
            let conflict = self
                .metrics
                .get(metric.name())
                .or_else(|| staged.get(metric.name()))
                .map(|existing| **existing != *metric);
            match conflict {
                Some(true) => return Err(VerifyError::DuplicateMetric(metric.name().to_string())),
                Some(false) => {}
                None => {
                    staged.insert(metric.name().to_string(), metric);
                }
            }
        }
        self.metrics.extend(staged);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Metric>> {
        self.metrics.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Resolve every metric-reference dependency and collect the failures.
    ///
    /// Filter-restricted specifications are resolved once per listed filter.
    pub fn lint(&self) -> Vec<VerifyError> {
        let mut problems = Vec::new();
        for metric in self.metrics.values() {
            for spec in metric.specs() {
                let filters: Vec<Option<&str>> = if spec.is_filter_agnostic() {
                    vec![None]
                } else {
                    spec.filter_names().iter().map(|f| Some(f.as_str())).collect()
                };
                for (name, dependency) in spec.dependencies() {
                    if !matches!(dependency, Dependency::Metric(_)) {
                        continue;
                    }
                    for filter in &filters {
                        if let Err(e) = spec.dependency(metric.name(), name, *filter, self) {
                            problems.push(e);
                        }
                    }
                }
            }
        }
        problems
    }
}

/// `metric` preceded by everything it references, depth first.
fn collect_referenced(metric: Arc<Metric>, out: &mut Vec<Arc<Metric>>) {
    for referenced in metric.referenced_definitions() {
        collect_referenced(Arc::clone(referenced), out);
    }
    out.push(metric);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::datum::DatumValue;

    const DEFINITIONS: &str = r#"
PA2:
  description: Photometric repeatability outlier limit
  operator: "<="
  specs:
    - level: design
      value: 15.0
      unit: mmag
    - level: minimum
      value: 20.0
      unit: mmag
PF1:
  description: Fraction of outliers beyond PA2
  operator: "<="
  unit: "%"
  specs:
    - level: design
      value: 10.0
      unit: "%"
      dependencies:
        - PA2
    - level: minimum
      value: 20.0
      unit: "%"
      dependencies: [PA2]
"#;

    #[test]
    fn test_from_yaml() {
        let set = MetricSet::from_yaml_str(DEFINITIONS).expect("definitions");
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["PA2", "PF1"]);
        assert!(set.lint().is_empty());
    }

    #[test]
    fn test_dependency_follows_referenced_metric() {
        let set = MetricSet::from_yaml_str(DEFINITIONS).expect("definitions");
        let pf1 = set.get("PF1").expect("PF1");
        let dep = pf1.dependency("design", None, "PA2", &set).expect("resolve");
        assert_eq!(dep.value(), Some(&DatumValue::Float(15.0)));
        assert_eq!(dep.unit(), "mmag");
        assert_eq!(dep.label(), Some("PA2"));

        let changed = MetricSet::from_yaml_str(&DEFINITIONS.replace("15.0", "12.5")).expect("definitions");
        let pf1 = changed.get("PF1").expect("PF1");
        let dep = pf1.dependency("design", None, "PA2", &changed).expect("resolve");
        assert_eq!(dep.value(), Some(&DatumValue::Float(12.5)));
    }

    #[test]
    fn test_lint_reports_missing_reference() {
        let text = DEFINITIONS.replace("- PA2", "- PA3");
        let set = MetricSet::from_yaml_str(&text).expect("definitions");
        let problems = set.lint();
        assert_eq!(problems.len(), 1);
        assert!(matches!(problems[0], VerifyError::DependencyResolution { .. }));
        assert!(problems[0].to_string().contains("PA3"));
    }

    #[test]
    fn test_insert_duplicate() {
        let set = MetricSet::from_yaml_str(DEFINITIONS).expect("definitions");
        let mut other = set.clone();
        let pa2 = set.get("PA2").expect("PA2").clone();
        other.insert(pa2).expect("identical re-insert");
        assert_eq!(other.len(), 2);

        let doc = serde_json::json!({
            "PA2": {"operator": ">=", "specs": [{"level": "design", "value": 1.0, "unit": "mmag"}]}
        });
        let conflicting = Metric::from_definition("PA2", &doc).expect("metric");
        let err = other.insert(conflicting).unwrap_err();
        assert!(matches!(err, VerifyError::DuplicateMetric(ref n) if n == "PA2"));
    }

    #[test]
    fn test_insert_brings_referenced_definitions() {
        let document: serde_json::Value = serde_yaml::from_str(DEFINITIONS).expect("yaml");
        let pf1 = Metric::from_definition("PF1", &document).expect("PF1");

        let mut set = MetricSet::new();
        set.insert(pf1.clone()).expect("PF1");
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["PA2", "PF1"]);
        assert!(set.lint().is_empty());

        let doc = serde_json::json!({
            "PA2": {"operator": ">=", "specs": [{"level": "design", "value": 1.0, "unit": "mmag"}]}
        });
        let mut other = MetricSet::new();
        other.insert(Metric::from_definition("PA2", &doc).expect("PA2")).expect("PA2");
        let err = other.insert(pf1).unwrap_err();
        assert!(matches!(err, VerifyError::DuplicateMetric(ref n) if n == "PA2"));
        assert_eq!(other.names().collect::<Vec<_>>(), vec!["PA2"]);
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let yaml = dir.path().join("metrics.yaml");
        std::fs::write(&yaml, DEFINITIONS).expect("write");
        assert_eq!(MetricSet::load(&yaml).expect("load").len(), 2);

        let json = dir.path().join("metrics.json");
        let document: serde_json::Value = serde_yaml::from_str(DEFINITIONS).expect("yaml");
        std::fs::write(&json, document.to_string()).expect("write");
        assert_eq!(MetricSet::load(&json).expect("load").len(), 2);

        let txt = dir.path().join("metrics.txt");
        std::fs::write(&txt, DEFINITIONS).expect("write");
        assert!(matches!(
            MetricSet::load(&txt).unwrap_err(),
            VerifyError::UnsupportedFormat(_)
        ));
    }

    #[test]
    fn test_document_must_be_mapping() {
        let err = MetricSet::from_document(&serde_json::json!(["PA1"])).unwrap_err();
        assert!(matches!(err, VerifyError::UnsupportedFormat(_)));
    }
}
