//! End-to-end: definitions → producers → job → checks → report.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use verify_core::{
    check_job, render_report, Job, Measurement, MeasurementProducer, Metric, MetricSet,
    ProducerRegistryBuilder, Quantity, Result, Verdict, VerifyError,
};

const DEFINITIONS: &str = r#"
AM1:
  description: RMS of distance distribution for stars separated by 5 arcmin
  operator: "<="
  unit: mas
  specs:
    - {level: design, value: 10.0, unit: mas, filter_names: [r, i]}
    - {level: design, value: 20.0, unit: mas, filter_names: [u, z, y]}
    - {level: minimum, value: 20.0, unit: mas}
PA1:
  operator: "<="
  specs:
    - {level: design, value: 5.0, unit: mmag}
    - {level: minimum, value: 8.0, unit: mmag}
"#;

/// Per-band astrometric scatter, in arcseconds.
struct Catalog {
    band: &'static str,
    offsets_arcsec: Vec<f64>,
}

struct Am1;

impl MeasurementProducer<Catalog> for Am1 {
    fn metric_name(&self) -> &str {
        "AM1"
    }

    fn produce(&self, metric: &Arc<Metric>, input: &Catalog) -> Result<Measurement> {
        let n = input.offsets_arcsec.len() as f64;
        let rms = (input.offsets_arcsec.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
        Measurement::new(Arc::clone(metric))
            .with_filter_name(input.band)
            .with_quantity(Quantity::new(rms, "arcsec")?)
    }
}

fn metrics() -> MetricSet {
    MetricSet::from_yaml_str(DEFINITIONS).expect("definitions")
}

#[test]
fn filter_specific_thresholds() {
    let metrics = metrics();
    let am1 = metrics.get("AM1").expect("AM1");

    let measured = Quantity::new(15.0, "mas").expect("quantity");
    assert!(!am1.check(&measured, "design", Some("r")).expect("r"));
    assert!(am1.check(&measured, "design", Some("z")).expect("z"));
    assert!(am1.check(&measured, "minimum", Some("g")).expect("agnostic"));

    let err = am1.check(&measured, "design", Some("g")).unwrap_err();
    assert!(matches!(err, VerifyError::UnknownFilter { ref filter, .. } if filter == "g"));
    let err = am1.check(&measured, "design", None).unwrap_err();
    assert!(matches!(err, VerifyError::AmbiguousSpecification { .. }));

    assert_eq!(am1.spec_names(Some("r")), vec!["design", "minimum"]);
    assert_eq!(am1.spec_names(Some("g")), vec!["minimum"]);
}

#[test]
fn quantities_are_converted_before_comparison() {
    let metrics = metrics();
    let am1 = metrics.get("AM1").expect("AM1");

    let arcsec = Quantity::new(0.009, "arcsec").expect("quantity");
    assert!(am1.check(&arcsec, "design", Some("i")).expect("converted"));

    let mag = Quantity::new(0.009, "mag").expect("quantity");
    let err = am1.check(&mag, "design", Some("i")).unwrap_err();
    assert!(matches!(err, VerifyError::IncompatibleUnits { .. }));

    let err = Measurement::new(Arc::clone(am1)).with_quantity(mag).unwrap_err();
    assert!(matches!(err, VerifyError::IncompatibleUnits { .. }));
}

#[test]
fn producers_fill_a_job_that_is_then_checked() {
    let metrics = metrics();
    let mut builder = ProducerRegistryBuilder::new();
    builder.register("am1", || Am1).expect("register");
    let registry = builder.build();

    let mut job = Job::with_metrics(metrics.clone());
    for catalog in [
        Catalog { band: "r", offsets_arcsec: vec![0.006, -0.008] },
        Catalog { band: "z", offsets_arcsec: vec![0.012, -0.016] },
    ] {
        let added = registry.produce_into(&mut job, &metrics, &catalog).expect("produce");
        assert_eq!(added, 1);
    }

    // A second r-band measurement collides with the first.
    let again = Catalog { band: "r", offsets_arcsec: vec![0.001] };
    let err = registry.produce_into(&mut job, &metrics, &again).unwrap_err();
    assert!(matches!(err, VerifyError::DuplicateMeasurement { .. }));

    job.register_measurement(Measurement::new(Arc::clone(
        metrics.get("PA1").expect("PA1"),
    )))
    .expect("PA1");

    assert_eq!(job.available_metrics(), vec!["AM1"]);
    assert_eq!(job.available_spec_levels(), vec!["design", "minimum"]);

    // rms(r) ≈ 7.07 mas and rms(z) ≈ 14.14 mas.
    assert_eq!(
        check_job(&job, "design"),
        vec![
            ("AM1.r".to_string(), Verdict::Pass),
            ("AM1.z".to_string(), Verdict::Pass),
            ("PA1".to_string(), Verdict::NotMeasured),
        ]
    );

    let report = render_report(&job);
    assert!(report.contains("AM1.r = 7.07e-03 arcsec"));
    assert!(report.contains("PA1 = not measured"));
}
