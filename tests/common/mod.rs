//! In-memory vCenter used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vcenter_exporter::annotation::AnnotationFilter;
use vcenter_exporter::config::DEFAULT_ANNOTATION_MARKER;
use vcenter_exporter::health_stats::HealthStats;
use vcenter_exporter::inventory::NameShortener;
use vcenter_exporter::poller::{Poller, PollerSettings};
use vcenter_exporter::vsphere::{
    ApiError, Counter, EntityMetric, ManagementApi, MetricId, MetricSeries, MoRef, ObjectKind,
    PerfQuerySpec, PowerState, VmSummary,
};

pub const VCENTER: &str = "vc01";

#[derive(Default)]
pub struct FakeApi {
    pub counters: Mutex<Vec<Counter>>,
    pub hosts: Mutex<Vec<(MoRef, String)>>,
    pub vms: Mutex<Vec<(MoRef, VmSummary)>>,
    /// VM ids whose summary fetch reports NotFound.
    pub vanished_summaries: Mutex<HashSet<String>>,
    /// VM ids whose stats query reports NotFound.
    pub vanished_perf: Mutex<HashSet<String>>,
    /// VM ids whose stats query returns no entity result at all.
    pub empty_perf: Mutex<HashSet<String>>,
    /// VM ids whose summary fetch fails with a generic fault.
    pub broken_summaries: Mutex<HashSet<String>>,
    pub perf: Mutex<HashMap<String, Vec<MetricSeries>>>,
    pub fail_listing: AtomicBool,
    pub session_expired: AtomicBool,
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub counter_queries: AtomicUsize,
    pub perf_queries: Mutex<Vec<PerfQuerySpec>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_counter(&self, key: i32, group: &str, name: &str, rollup: &str) {
        self.counters
            .lock()
            .unwrap()
            .push(Counter::new(key, group, name, rollup));
    }

    pub fn set_counters(&self, counters: Vec<Counter>) {
        *self.counters.lock().unwrap() = counters;
    }

    pub fn add_host(&self, id: &str, name: &str) {
        self.hosts
            .lock()
            .unwrap()
            .push((MoRef::new("HostSystem", id), name.to_string()));
    }

    pub fn add_vm(&self, id: &str, summary: VmSummary) {
        self.vms
            .lock()
            .unwrap()
            .push((MoRef::new("VirtualMachine", id), summary));
    }

    pub fn set_perf(&self, id: &str, series: Vec<MetricSeries>) {
        self.perf.lock().unwrap().insert(id.to_string(), series);
    }

    pub fn vanish_summary(&self, id: &str) {
        self.vanished_summaries.lock().unwrap().insert(id.to_string());
    }

    pub fn vanish_perf(&self, id: &str) {
        self.vanished_perf.lock().unwrap().insert(id.to_string());
    }

    pub fn empty_perf_result(&self, id: &str) {
        self.empty_perf.lock().unwrap().insert(id.to_string());
    }

    pub fn break_summary(&self, id: &str) {
        self.broken_summaries.lock().unwrap().insert(id.to_string());
    }

    pub fn perf_query_count(&self) -> usize {
        self.perf_queries.lock().unwrap().len()
    }

    pub fn queried_vms(&self) -> Vec<String> {
        self.perf_queries
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.entity.value.clone())
            .collect()
    }

    fn check_session(&self) -> Result<(), ApiError> {
        if self.session_expired.load(Ordering::SeqCst) {
            Err(ApiError::NotAuthenticated)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ManagementApi for FakeApi {
    async fn login(&self) -> Result<(), ApiError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.session_expired.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_counters(&self, _level: i32) -> Result<Vec<Counter>, ApiError> {
        self.check_session()?;
        self.counter_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.counters.lock().unwrap().clone())
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<MoRef>, ApiError> {
        self.check_session()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ApiError::Fault {
                fault: "SystemError".into(),
                message: "view creation failed".into(),
            });
        }
        Ok(match kind {
            ObjectKind::HostSystem => self
                .hosts
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect(),
            ObjectKind::VirtualMachine => self
                .vms
                .lock()
                .unwrap()
                .iter()
                .map(|(m, _)| m.clone())
                .collect(),
        })
    }

    async fn host_name(&self, host: &MoRef) -> Result<String, ApiError> {
        self.check_session()?;
        self.hosts
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == host)
            .map(|(_, name)| name.clone())
            .ok_or_else(|| ApiError::NotFound(host.to_string()))
    }

    async fn vm_summary(&self, vm: &MoRef) -> Result<VmSummary, ApiError> {
        self.check_session()?;
        if self.vanished_summaries.lock().unwrap().contains(&vm.value) {
            return Err(ApiError::NotFound(vm.to_string()));
        }
        if self.broken_summaries.lock().unwrap().contains(&vm.value) {
            return Err(ApiError::Fault {
                fault: "SystemError".into(),
                message: "summary unavailable".into(),
            });
        }
        self.vms
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == vm)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| ApiError::NotFound(vm.to_string()))
    }

    async fn query_perf(&self, specs: &[PerfQuerySpec]) -> Result<Vec<EntityMetric>, ApiError> {
        self.check_session()?;
        self.perf_queries
            .lock()
            .unwrap()
            .extend(specs.iter().cloned());

        let mut results = Vec::new();
        for spec in specs {
            if self.vanished_perf.lock().unwrap().contains(&spec.entity.value) {
                return Err(ApiError::NotFound(spec.entity.to_string()));
            }
            if self.empty_perf.lock().unwrap().contains(&spec.entity.value) {
                continue;
            }
            let requested: HashSet<i32> = spec.metric_ids.iter().map(|m| m.counter_id).collect();
            let series = self
                .perf
                .lock()
                .unwrap()
                .get(&spec.entity.value)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|s| requested.contains(&s.id.counter_id))
                .collect();
            results.push(EntityMetric {
                entity: Some(spec.entity.clone()),
                value: series,
            });
        }
        Ok(results)
    }
}

pub fn vm(name: &str, power_state: PowerState, annotation: Option<&str>, host: Option<&str>) -> VmSummary {
    VmSummary {
        name: name.to_string(),
        power_state,
        annotation: annotation.map(str::to_string),
        instance_uuid: Some(format!("uuid-{}", name)),
        host: host.map(|h| MoRef::new("HostSystem", h)),
    }
}

pub fn series(counter_id: i32, instance: &str, value: i64) -> MetricSeries {
    MetricSeries {
        id: MetricId {
            counter_id,
            instance: instance.to_string(),
        },
        value: vec![value],
    }
}

pub fn settings(vm_metrics: Option<Vec<String>>) -> PollerSettings {
    PollerSettings {
        interval: Duration::from_secs(1),
        interval_id: 20,
        counter_level: 4,
        vm_metrics,
        vcenter_name: VCENTER.to_string(),
    }
}

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub poller: Poller,
    pub registry: Registry,
    pub health: Arc<HealthStats>,
}

pub async fn start(api: Arc<FakeApi>, vm_metrics: Option<Vec<String>>) -> Harness {
    let registry = Registry::new();
    let health = Arc::new(HealthStats::new());
    let dyn_api: Arc<dyn ManagementApi> = api.clone();
    let poller = Poller::start(
        dyn_api,
        settings(vm_metrics),
        AnnotationFilter::new(DEFAULT_ANNOTATION_MARKER).unwrap(),
        NameShortener::new(None).unwrap(),
        registry.clone(),
        health.clone(),
    )
    .await
    .unwrap();

    Harness {
        api,
        poller,
        registry,
        health,
    }
}

pub fn render(registry: &Registry) -> String {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .unwrap();
    String::from_utf8(buf).unwrap()
}

/// Value of the series of `metric` carrying all of `labels`, if exposed.
pub fn sample_value(registry: &Registry, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let text = render(registry);
    text.lines()
        .filter(|line| line.starts_with(&format!("{}{{", metric)))
        .find(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}
