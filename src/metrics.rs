//! Exporter self-metrics.
//!
//! Describe the poll loop itself; the per-counter VM gauges live in
//! [`crate::gauges`].

use prometheus::{Gauge, Registry};

#[derive(Clone)]
pub struct ExporterMetrics {
    pub cycle_duration_seconds: Gauge,
    pub cycle_success: Gauge,
    pub vms_total: Gauge,
    pub vms_sampled: Gauge,
    pub counters_total: Gauge,
}

impl ExporterMetrics {
    /// Creates and registers all exporter metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let cycle_duration_seconds = Gauge::new(
            "vcenter_exporter_cycle_duration_seconds",
            "Time spent in the last poll cycle",
        )?;
        let cycle_success = Gauge::new(
            "vcenter_exporter_cycle_success",
            "Whether the last poll cycle completed (1) or failed (0)",
        )?;
        let vms_total = Gauge::new(
            "vcenter_exporter_vms_total",
            "Powered-on VMs with a valid ownership annotation in the last cycle",
        )?;
        let vms_sampled = Gauge::new(
            "vcenter_exporter_vms_sampled",
            "VMs whose stats query succeeded in the last cycle",
        )?;
        let counters_total = Gauge::new(
            "vcenter_exporter_counters_total",
            "Performance counters sampled per VM",
        )?;

        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(cycle_success.clone()))?;
        registry.register(Box::new(vms_total.clone()))?;
        registry.register(Box::new(vms_sampled.clone()))?;
        registry.register(Box::new(counters_total.clone()))?;

        Ok(Self {
            cycle_duration_seconds,
            cycle_success,
            vms_total,
            vms_sampled,
            counters_total,
        })
    }
}
