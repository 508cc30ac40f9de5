// Copyright 2025 refcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{borrow::Cow, collections::HashMap, sync::Arc};

use itertools::Itertools;
use parking_lot::Mutex;
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use crate::{
    metrics::{
        registry::noop::NoopMetricsRegistry, BoxedCounter, BoxedCounterVec, BoxedGauge, BoxedGaugeVec, Boxer,
        CounterOps, CounterVecOps, GaugeOps, GaugeVecOps, RegistryOps,
    },
    scope::Scope,
};

impl CounterOps for IntCounter {
    fn increase(&self, val: u64) {
        self.inc_by(val);
    }
}

impl CounterVecOps for IntCounterVec {
    fn counter(&self, labels: &[Cow<'static, str>]) -> BoxedCounter {
        let labels = labels.iter().map(Cow::as_ref).collect_vec();
        self.with_label_values(labels.as_slice()).boxed()
    }
}

impl GaugeOps for IntGauge {
    fn increase(&self, val: u64) {
        self.add(val as _);
    }

    fn decrease(&self, val: u64) {
        self.sub(val as _);
    }

    fn absolute(&self, val: u64) {
        self.set(val as _);
    }
}

impl GaugeVecOps for IntGaugeVec {
    fn gauge(&self, labels: &[Cow<'static, str>]) -> BoxedGauge {
        let labels = labels.iter().map(Cow::as_ref).collect_vec();
        self.with_label_values(labels.as_slice()).boxed()
    }
}

#[derive(Debug, Clone)]
enum MetricVec {
    Counter(IntCounterVec),
    Gauge(IntGaugeVec),
}

/// Prometheus metric registry with lib `prometheus`.
///
/// Metric vectors are registered once per name, so the same [`PrometheusMetricsRegistry`] (or any of its clones) can
/// be shared by multiple caches distinguished by their `name` label.
#[derive(Debug, Clone)]
pub struct PrometheusMetricsRegistry {
    registry: Registry,
    vecs: Arc<Mutex<HashMap<Cow<'static, str>, MetricVec>>>,
}

impl PrometheusMetricsRegistry {
    /// Create an Prometheus metrics registry.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            vecs: Arc::default(),
        }
    }

    /// Get the underlying registry, e.g. for gathering.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn register(
        &self,
        name: Cow<'static, str>,
        create: impl FnOnce() -> prometheus::Result<MetricVec>,
    ) -> Option<MetricVec> {
        self.vecs.lock().with(|mut vecs| {
            if let Some(vec) = vecs.get(&name) {
                return Some(vec.clone());
            }
            let vec = match create() {
                Ok(vec) => vec,
                Err(e) => {
                    tracing::warn!("[prometheus]: create metric vec {name} failed, fallback to noop: {e}");
                    return None;
                }
            };
            let res = match &vec {
                MetricVec::Counter(v) => self.registry.register(Box::new(v.clone())),
                MetricVec::Gauge(v) => self.registry.register(Box::new(v.clone())),
            };
            if let Err(e) = res {
                tracing::warn!("[prometheus]: register metric vec {name} failed, it will not be exported: {e}");
            }
            vecs.insert(name, vec.clone());
            Some(vec)
        })
    }
}

impl RegistryOps for PrometheusMetricsRegistry {
    fn register_counter_vec(
        &self,
        name: Cow<'static, str>,
        desc: Cow<'static, str>,
        label_names: &'static [&'static str],
    ) -> BoxedCounterVec {
        let opts = Opts::new(name.as_ref(), desc.as_ref());
        match self.register(name, || IntCounterVec::new(opts, label_names).map(MetricVec::Counter)) {
            Some(MetricVec::Counter(v)) => v.boxed(),
            _ => NoopMetricsRegistry.boxed(),
        }
    }

    fn register_gauge_vec(
        &self,
        name: Cow<'static, str>,
        desc: Cow<'static, str>,
        label_names: &'static [&'static str],
    ) -> BoxedGaugeVec {
        let opts = Opts::new(name.as_ref(), desc.as_ref());
        match self.register(name, || IntGaugeVec::new(opts, label_names).map(MetricVec::Gauge)) {
            Some(MetricVec::Gauge(v)) => v.boxed(),
            _ => NoopMetricsRegistry.boxed(),
        }
    }
}
