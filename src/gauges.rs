//! Gauge registry.
//!
//! One labeled `GaugeVec` per discovered counter, registered on the exporter's
//! Prometheus registry and indexed by counter id for the per-sample lookup.
//!
//! Label combinations are never removed: a VM that disappears keeps its last
//! value until the process restarts.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use prometheus::{GaugeVec, Opts, Registry};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::catalog::CounterCatalog;
use crate::vsphere::Counter;

/// Prefix of every counter gauge.
pub const METRIC_PREFIX: &str = "vcenter_";

/// Label set shared by all counter gauges, in `with_label_values` order.
pub const LABEL_NAMES: [&str; 6] = [
    "vm_name",
    "project_id",
    "vcenter_name",
    "vcenter_node",
    "instance_uuid",
    "metric_detail",
];

static INVALID_METRIC_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_:]").expect("static regex is valid"));

#[derive(Debug, Error)]
pub enum GaugeError {
    #[error("no gauge registered for counter id {0}")]
    UnknownCounter(i32),

    #[error("failed to register gauge: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Derives the gauge name from a counter full name:
/// `cpu.usagemhz.average` becomes `vcenter_cpu_usagemhz_average`.
pub fn metric_name(full_name: &str) -> String {
    let name = format!("{}{}", METRIC_PREFIX, full_name.replace('.', "_"));
    INVALID_METRIC_CHARS.replace_all(&name, "_").into_owned()
}

/// Label values for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeLabels<'a> {
    pub vm_name: &'a str,
    pub project_id: &'a str,
    pub vcenter_name: &'a str,
    pub vcenter_node: &'a str,
    pub instance_uuid: &'a str,
    pub metric_detail: &'a str,
}

impl<'a> GaugeLabels<'a> {
    pub fn values(&self) -> [&'a str; 6] {
        [
            self.vm_name,
            self.project_id,
            self.vcenter_name,
            self.vcenter_node,
            self.instance_uuid,
            self.metric_detail,
        ]
    }
}

pub struct GaugeRegistry {
    registry: Registry,
    by_name: HashMap<String, GaugeVec>,
    by_counter: HashMap<i32, GaugeVec>,
}

impl GaugeRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            by_name: HashMap::new(),
            by_counter: HashMap::new(),
        }
    }

    /// Registers the gauge for `counter` and binds the counter id to it.
    /// A gauge that already exists under the same name is reused, so calling
    /// this again after a re-login only rebinds the id.
    pub fn register(&mut self, counter: &Counter) -> Result<GaugeVec, GaugeError> {
        let name = metric_name(&counter.full_name());

        let gauge = match self.by_name.get(&name) {
            Some(existing) => existing.clone(),
            None => {
                let help = counter.summary.clone().unwrap_or_else(|| name.clone());
                let gauge = GaugeVec::new(Opts::new(name.clone(), help), &LABEL_NAMES)?;
                self.registry.register(Box::new(gauge.clone()))?;
                debug!("Registered gauge {}", name);
                self.by_name.insert(name, gauge.clone());
                gauge
            }
        };

        self.by_counter.insert(counter.key, gauge.clone());
        Ok(gauge)
    }

    /// Registers a gauge for every counter in the catalog, including counters
    /// that are not selected for sampling.
    pub fn register_catalog(&mut self, catalog: &CounterCatalog) -> Result<usize, GaugeError> {
        for counter in catalog.counters() {
            self.register(counter)?;
        }
        Ok(catalog.len())
    }

    /// Drops all id bindings and binds the ids of a fresh catalog. Gauges and
    /// their series stay registered.
    pub fn rebind(&mut self, catalog: &CounterCatalog) -> Result<usize, GaugeError> {
        self.by_counter.clear();
        self.register_catalog(catalog)
    }

    pub fn lookup(&self, counter_id: i32) -> Result<&GaugeVec, GaugeError> {
        self.by_counter
            .get(&counter_id)
            .ok_or(GaugeError::UnknownCounter(counter_id))
    }

    pub fn set(&self, counter_id: i32, labels: &GaugeLabels<'_>, value: f64) -> Result<(), GaugeError> {
        self.lookup(counter_id)?
            .with_label_values(&labels.values())
            .set(value);
        Ok(())
    }

    /// Number of distinct gauges.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
