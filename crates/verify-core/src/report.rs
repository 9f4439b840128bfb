//! Plain-text views of a job for terminals.

use std::fmt;

use crate::domain::measurement::Measurement;
use crate::job::Job;

/// Render job metadata and measurements.
///
/// Metadata keys that mention a measured metric are left out of the common
/// section. Measurements are sorted by identifier; keys are right-aligned so
/// the `=` signs line up. Specification outcomes are not shown.
pub fn render_report(job: &Job) -> String {
    let mut measurements: Vec<&Measurement> = job.measurements().iter().collect();
    measurements.sort_by_key(|m| m.identifier());
    let metric_names: Vec<&str> = measurements.iter().map(|m| m.metric_name()).collect();

    let width = job
        .meta()
        .keys()
        .map(String::len)
        .chain(measurements.iter().map(|m| m.identifier().len()))
        .max()
        .unwrap_or(0);

    let mut out = String::from("Common metadata:\n");
    for (key, value) in job.meta() {
        if metric_names.iter().any(|name| key.contains(name)) {
            continue;
        }
        out.push_str(&format!("{key:>width$} = {}\n", plain(value)));
    }

    out.push_str("\nMeasurements:\n");
    for m in measurements {
        let value = match m.quantity() {
            Some(q) => format!("{} {}", format_value(q.value), q.unit),
            None => "not measured".to_string(),
        };
        let value = value.trim_end();
        out.push_str(&format!("{:>width$} = {value:>10}", m.identifier()));
        if !m.notes().is_empty() {
            let prefix = format!("{}.", m.metric_name());
            let notes: Vec<String> = m
                .notes()
                .iter()
                .map(|(k, v)| format!("{}: {}", k.strip_prefix(&prefix).unwrap_or(k), plain(v)))
                .collect();
            out.push_str(&format!(" ({})", notes.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// Two decimals, switching to scientific notation below 1e-2.
pub fn format_value(value: f64) -> String {
    if value >= 1e-2 || value.is_nan() {
        return format!("{value:.2}");
    }
    let sci = format!("{value:.2e}");
    match sci.split_once('e') {
        Some((mantissa, exp)) => match exp.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            Err(_) => sci,
        },
        None => sci,
    }
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Outcome of comparing one measurement with a specification level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    NotMeasured,
    /// The level could not be resolved or the units did not convert.
    Unresolved(String),
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Fail | Verdict::Unresolved(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("pass"),
            Verdict::Fail => f.write_str("FAIL"),
            Verdict::NotMeasured => f.write_str("not measured"),
            Verdict::Unresolved(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Check every measurement of `job` against `level`, sorted by identifier.
pub fn check_job(job: &Job, level: &str) -> Vec<(String, Verdict)> {
    let mut results: Vec<(String, Verdict)> = job
        .measurements()
        .iter()
        .map(|m| {
            let verdict = match m.check_spec(level) {
                Ok(Some(true)) => Verdict::Pass,
                Ok(Some(false)) => Verdict::Fail,
                Ok(None) => Verdict::NotMeasured,
                Err(e) => Verdict::Unresolved(e.to_string()),
            };
            (m.identifier(), verdict)
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

pub fn render_check(level: &str, results: &[(String, Verdict)]) -> String {
    let width = results.iter().map(|(id, _)| id.len()).max().unwrap_or(0);
    let mut out = format!("Specification level {level}:\n");
    for (id, verdict) in results {
        out.push_str(&format!("{id:>width$} : {verdict}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::datum::Quantity;
    use crate::domain::metric::{Metric, Operator};
    use crate::domain::spec::Specification;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn metric(name: &str, unit: &str, threshold: f64) -> Arc<Metric> {
        let design = Specification::new("design", threshold, unit).expect("spec");
        Arc::new(Metric::new(name, "", Operator::LessEqual, vec![design]).expect("metric"))
    }

    fn demo_job() -> Job {
        let mut job = Job::new();
        job.set_meta("instrument", "HSC");
        job.set_meta("ccd", 42);
        job.set_meta("PA1.rms_iterations", 3);

        let mut pa1 = Measurement::new(metric("PA1", "mmag", 5.0))
            .with_quantity(Quantity::new(4.123, "mmag").expect("quantity"))
            .expect("compatible");
        pa1.add_note("PA1.nights", 3);
        job.register_measurement(pa1).expect("PA1");

        let am1 = Measurement::new(metric("AM1", "arcsec", 0.01))
            .with_quantity(Quantity::new(0.0042, "arcsec").expect("quantity"))
            .expect("compatible");
        job.register_measurement(am1).expect("AM1");

        job.register_measurement(Measurement::new(metric("TE1", "", 1.0)))
            .expect("TE1");
        job
    }

    #[test]
    fn test_render_report_layout() {
        let expected = "\
Common metadata:
               ccd = 42
        instrument = HSC

Measurements:
               AM1 = 4.20e-03 arcsec
               PA1 =  4.12 mmag (nights: 3)
               TE1 = not measured
";
        assert_eq!(render_report(&demo_job()), expected);
    }

    #[test]
    fn test_empty_job() {
        assert_eq!(render_report(&Job::new()), "Common metadata:\n\nMeasurements:\n");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(8.5), "8.50");
        assert_eq!(format_value(0.01), "0.01");
        assert_eq!(format_value(0.0085), "8.50e-03");
        assert_eq!(format_value(0.0), "0.00e+00");
        assert_eq!(format_value(1234.5678), "1234.57");
    }

    #[test]
    fn test_check_job() {
        let job = demo_job();
        let results = check_job(&job, "design");
        assert_eq!(
            results,
            vec![
                ("AM1".to_string(), Verdict::Pass),
                ("PA1".to_string(), Verdict::Pass),
                ("TE1".to_string(), Verdict::NotMeasured),
            ]
        );
        assert!(!results.iter().any(|(_, v)| v.is_failure()));

        let results = check_job(&job, "stretch");
        assert!(results[0].1.is_failure());
        let text = render_check("stretch", &results);
        assert!(text.starts_with("Specification level stretch:\n"));
        assert!(text.contains("TE1 : not measured"));
    }
}
