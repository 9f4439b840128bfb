//! Pluggable measurement producers.
//!
//! Code that computes metrics implements [`MeasurementProducer`] for the input
//! it consumes. Producers are registered by key on a
//! [`ProducerRegistryBuilder`] at startup; the built [`ProducerRegistry`] is
//! read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::definitions::MetricSet;
use crate::domain::error::{Result, VerifyError};
use crate::domain::measurement::Measurement;
use crate::domain::metric::Metric;
use crate::job::Job;

/// Computes one measurement of a metric from an input of type `I`.
pub trait MeasurementProducer<I>: Send + Sync {
    /// Name of the metric this producer measures.
    fn metric_name(&self) -> &str;

    fn produce(&self, metric: &Arc<Metric>, input: &I) -> Result<Measurement>;
}

type Factory<I> = Box<dyn Fn() -> Box<dyn MeasurementProducer<I>> + Send + Sync>;

/// Mutable registration phase of a [`ProducerRegistry`].
pub struct ProducerRegistryBuilder<I> {
    factories: BTreeMap<String, Factory<I>>,
}

impl<I> Default for ProducerRegistryBuilder<I> {
    fn default() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }
}

impl<I> ProducerRegistryBuilder<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `key`; keys are unique.
    pub fn register<F, P>(&mut self, key: impl Into<String>, factory: F) -> Result<&mut Self>
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: MeasurementProducer<I> + 'static,
    {
        let key = key.into();
        if self.factories.contains_key(&key) {
            return Err(VerifyError::DuplicateProducer(key));
        }
        self.factories
            .insert(key, Box::new(move || Box::new(factory()) as Box<dyn MeasurementProducer<I>>));
        Ok(self)
    }

    pub fn build(self) -> ProducerRegistry<I> {
        ProducerRegistry {
            factories: self.factories,
        }
    }
}

/// Read-only key → producer factory mapping.
pub struct ProducerRegistry<I> {
    factories: BTreeMap<String, Factory<I>>,
}

impl<I> ProducerRegistry<I> {
    pub fn create(&self, key: &str) -> Result<Box<dyn MeasurementProducer<I>>> {
        self.factories
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| VerifyError::ProducerNotFound(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run every producer whose metric is defined in `metrics` and register
    /// the results into `job`. Returns the number of measurements added.
    pub fn produce_into(&self, job: &mut Job, metrics: &MetricSet, input: &I) -> Result<usize> {
        let mut produced = 0;
        for (key, factory) in &self.factories {
            let producer = factory();
            let Some(metric) = metrics.get(producer.metric_name()) else {
                tracing::debug!(producer = %key, metric = %producer.metric_name(), "metric not defined, skipping");
                continue;
            };
            let measurement = producer.produce(metric, input)?;
            job.register_measurement(measurement)?;
            produced += 1;
        }
        Ok(produced)
    }
}
