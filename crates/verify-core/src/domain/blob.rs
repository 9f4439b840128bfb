//! Shared datum bundles referenced by measurements.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::datum::{Datum, DatumValue};
use crate::domain::datum_set::{DatumSet, Registration};
use crate::domain::error::Result;

/// A named bundle of datums shared by several measurements.
///
/// Each blob gets a fresh identifier at construction; two blobs holding the
/// same data are still distinct. Measurements hold blobs through `Arc` and a
/// job serializes every identifier once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    identifier: String,
    name: String,
    #[serde(rename = "data", default)]
    datums: DatumSet,
}

impl Blob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identifier: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            datums: DatumSet::new(),
        }
    }

    /// Type-level name, e.g. `MatchedMultiVisitDataset`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn register_datum(&mut self, name: &str, registration: Registration) -> Result<()> {
        self.datums.register(name, registration)
    }

    pub fn datum(&self, name: &str) -> Option<&Datum> {
        self.datums.get(name)
    }

    pub fn value(&self, name: &str) -> Result<Option<&DatumValue>> {
        self.datums.value(name).map_err(|e| e.with_owner(&self.owner()))
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<DatumValue>) -> Result<()> {
        let owner = self.owner();
        self.datums
            .set_value(name, value)
            .map_err(|e| e.with_owner(&owner))
    }

    pub fn datums(&self) -> &DatumSet {
        &self.datums
    }

    fn owner(&self) -> String {
        format!("blob {} ({})", self.name, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VerifyError;

    fn demo_blob() -> Blob {
        let mut blob = Blob::new("DemoBlob");
        blob.register_datum(
            "mag",
            Registration::value(vec![1.0, 2.0, 3.0]).unit("mag").description("Magnitudes"),
        )
        .expect("register");
        blob.register_datum("snr", Registration::value(vec![10.0, 20.0, 30.0]))
            .expect("register");
        blob
    }

    #[test]
    fn test_identifier_is_unique_hex() {
        let a = demo_blob();
        let b = demo_blob();
        assert_ne!(a.identifier(), b.identifier());
        assert_eq!(a.identifier().len(), 32);
        assert!(a.identifier().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_datum_access() {
        let mut blob = demo_blob();
        assert_eq!(blob.datum("mag").map(Datum::unit), Some("mag"));
        assert_eq!(blob.datum("mag").and_then(Datum::label), Some("mag"));
        blob.set_value("snr", vec![1.0]).expect("registered");
        assert_eq!(
            blob.value("snr").expect("registered"),
            Some(&DatumValue::List(vec![DatumValue::Float(1.0)]))
        );
    }

    #[test]
    fn test_unknown_datum_names_blob() {
        let blob = demo_blob();
        let err = blob.value("flux").unwrap_err();
        assert!(matches!(err, VerifyError::UnknownDatum { .. }));
        assert!(err.to_string().contains("blob DemoBlob"));
    }

    #[test]
    fn test_json_shape() {
        let blob = demo_blob();
        let v = serde_json::to_value(&blob).expect("serialize");
        assert_eq!(v["name"], "DemoBlob");
        assert_eq!(v["identifier"], blob.identifier());
        assert_eq!(v["data"]["mag"]["unit"], "mag");
        let back: Blob = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back, blob);
    }
}
