//! Per-VM sampling.
//!
//! One batched stats query per VM covers every selected counter (wildcard
//! instance). Each returned series becomes one gauge observation unless it
//! carries the `-1` no-data sentinel.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::gauges::{GaugeLabels, GaugeRegistry};
use crate::vsphere::{ApiError, EntityMetric, ManagementApi, MetricId, MoRef, PerfQuerySpec};

/// Value vCenter reports when no sample exists for the interval.
pub const NO_DATA: i64 = -1;

/// `metric_detail` label value for the aggregate (empty) instance.
pub const DETAIL_AGGREGATE: &str = "none";

/// Only the most recent sample is requested.
pub const MAX_SAMPLE: i32 = 1;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("stats query for {0} returned no result")]
    EmptyResult(MoRef),
}

/// Label values that are fixed for all samples of one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmLabels {
    pub vm_name: String,
    pub project_id: String,
    pub vcenter_name: String,
    pub vcenter_node: String,
    pub instance_uuid: String,
}

impl VmLabels {
    fn with_detail<'a>(&'a self, metric_detail: &'a str) -> GaugeLabels<'a> {
        GaugeLabels {
            vm_name: &self.vm_name,
            project_id: &self.project_id,
            vcenter_name: &self.vcenter_name,
            vcenter_node: &self.vcenter_node,
            instance_uuid: &self.instance_uuid,
            metric_detail,
        }
    }
}

/// Per-VM tally of what happened to the returned series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleOutcome {
    pub set: usize,
    pub suppressed: usize,
    pub unknown_counter: usize,
    pub empty_series: usize,
}

impl SampleOutcome {
    pub fn merge(&mut self, other: SampleOutcome) {
        self.set += other.set;
        self.suppressed += other.suppressed;
        self.unknown_counter += other.unknown_counter;
        self.empty_series += other.empty_series;
    }
}

pub fn metric_detail(instance: &str) -> &str {
    if instance.is_empty() {
        DETAIL_AGGREGATE
    } else {
        instance
    }
}

pub fn build_query(vm: &MoRef, counter_ids: &[i32], interval_id: i32) -> PerfQuerySpec {
    PerfQuerySpec {
        entity: vm.clone(),
        metric_ids: counter_ids.iter().copied().map(MetricId::wildcard).collect(),
        max_sample: MAX_SAMPLE,
        interval_id,
    }
}

/// Writes the series of one stats result into the gauges.
pub fn apply_samples(
    gauges: &GaugeRegistry,
    metrics: &EntityMetric,
    labels: &VmLabels,
) -> SampleOutcome {
    let mut outcome = SampleOutcome::default();

    for series in &metrics.value {
        let Some(&value) = series.value.first() else {
            outcome.empty_series += 1;
            continue;
        };
        if value == NO_DATA {
            outcome.suppressed += 1;
            continue;
        }

        let detail = metric_detail(&series.id.instance);
        match gauges.set(series.id.counter_id, &labels.with_detail(detail), value as f64) {
            Ok(()) => outcome.set += 1,
            Err(e) => {
                debug!("Dropping sample: {}", e);
                outcome.unknown_counter += 1;
            }
        }
    }

    outcome
}

/// Queries the latest stats of one VM and updates the gauges.
#[instrument(skip_all, fields(vm = %vm))]
pub async fn sample_vm<A>(
    api: &A,
    gauges: &GaugeRegistry,
    vm: &MoRef,
    counter_ids: &[i32],
    interval_id: i32,
    labels: &VmLabels,
) -> Result<SampleOutcome, SampleError>
where
    A: ManagementApi + ?Sized,
{
    if counter_ids.is_empty() {
        return Ok(SampleOutcome::default());
    }

    let spec = build_query(vm, counter_ids, interval_id);
    let result = api.query_perf(std::slice::from_ref(&spec)).await?;
    let metrics = result
        .first()
        .ok_or_else(|| SampleError::EmptyResult(vm.clone()))?;

    Ok(apply_samples(gauges, metrics, labels))
}
