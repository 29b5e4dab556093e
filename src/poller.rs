//! Poll loop.
//!
//! `Connect -> DiscoverCounters -> RegisterGauges -> loop { Enumerate -> Sample -> Sleep }`.
//! Connecting happens before a [`Poller`] is built; [`Poller::start`] covers
//! discovery and registration, [`Poller::run`] the endless loop.
//!
//! Failures are contained at three levels: a single sample (skipped), a
//! single VM (logged, next VM), a whole cycle (logged, retried after the
//! usual interval). Only startup failures reach the caller.

use prometheus::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::annotation::{Annotation, AnnotationFilter};
use crate::catalog::CounterCatalog;
use crate::config::MainConfig;
use crate::gauges::{GaugeError, GaugeRegistry};
use crate::health_stats::HealthStats;
use crate::inventory::{self, InventoryCounts, NameShortener};
use crate::metrics::ExporterMetrics;
use crate::sampler::{self, SampleError, SampleOutcome, VmLabels};
use crate::vsphere::{ApiError, ManagementApi};

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("counter discovery failed: {0}")]
    Discovery(#[from] ApiError),

    #[error("vCenter offered no performance counters")]
    NoCounters,

    #[error(transparent)]
    Gauge(#[from] GaugeError),

    #[error("failed to register exporter metrics: {0}")]
    Telemetry(#[from] prometheus::Error),
}

/// Loop parameters derived from the `main` config section.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub interval_id: i32,
    pub counter_level: i32,
    pub vm_metrics: Option<Vec<String>>,
    /// `vcenter_name` label value.
    pub vcenter_name: String,
}

impl PollerSettings {
    pub fn from_config(cfg: &MainConfig, shortener: &NameShortener) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval()),
            interval_id: cfg.interval_id(),
            counter_level: cfg.counter_level(),
            vm_metrics: cfg.vm_metrics.clone(),
            vcenter_name: shortener.shorten(cfg.host()),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub inventory: InventoryCounts,
    pub rejected_annotations: usize,
    pub eligible: usize,
    pub sampled: usize,
    pub vanished: usize,
    pub failed: usize,
    pub samples: SampleOutcome,
}

pub struct Poller {
    api: Arc<dyn ManagementApi>,
    settings: PollerSettings,
    filter: AnnotationFilter,
    shortener: NameShortener,
    catalog: CounterCatalog,
    selected: Vec<i32>,
    gauges: GaugeRegistry,
    telemetry: ExporterMetrics,
    health: Arc<HealthStats>,
}

impl Poller {
    /// Discovers the counter catalog and registers one gauge per counter on
    /// `registry`. Any error here is fatal for the exporter.
    pub async fn start(
        api: Arc<dyn ManagementApi>,
        settings: PollerSettings,
        filter: AnnotationFilter,
        shortener: NameShortener,
        registry: Registry,
        health: Arc<HealthStats>,
    ) -> Result<Self, PollerError> {
        let telemetry = ExporterMetrics::new(&registry)?;

        let catalog = CounterCatalog::discover(api.as_ref(), settings.counter_level).await?;
        if catalog.is_empty() {
            return Err(PollerError::NoCounters);
        }

        let mut gauges = GaugeRegistry::new(registry);
        let registered = gauges.register_catalog(&catalog)?;
        let selected = catalog.select(settings.vm_metrics.as_deref());
        telemetry.counters_total.set(selected.len() as f64);

        info!(
            "Registered {} gauges, sampling {} counters per VM",
            registered,
            selected.len()
        );

        Ok(Self {
            api,
            settings,
            filter,
            shortener,
            catalog,
            selected,
            gauges,
            telemetry,
            health,
        })
    }

    pub fn catalog(&self) -> &CounterCatalog {
        &self.catalog
    }

    /// Counter ids queried for every VM.
    pub fn selected(&self) -> &[i32] {
        &self.selected
    }

    pub fn gauges(&self) -> &GaugeRegistry {
        &self.gauges
    }

    /// One enumeration and sampling pass. Errors are cycle-scoped: they come
    /// from listing the inventory or from a lost session.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, ApiError> {
        let api = self.api.as_ref();
        let hosts = inventory::list_hosts(api, &self.shortener).await?;
        let (vms, counts) = inventory::list_running_annotated_vms(api, &self.filter).await?;

        let mut report = CycleReport {
            inventory: counts,
            vanished: counts.vanished,
            ..CycleReport::default()
        };

        for vm in &vms {
            let annotation = match Annotation::parse(&vm.annotation) {
                Ok(annotation) => annotation,
                Err(e) => {
                    debug!("Skipping {} ({}): {}", vm.name, vm.moref, e);
                    report.rejected_annotations += 1;
                    self.health.record_rejected_annotation();
                    continue;
                }
            };
            report.eligible += 1;
            debug!("current vm processed - {}", vm.name);

            let vcenter_node = vm
                .host
                .as_ref()
                .and_then(|h| hosts.get(h))
                .cloned()
                .unwrap_or_default();

            let labels = VmLabels {
                vm_name: annotation.name().to_string(),
                project_id: annotation.project_id().to_string(),
                vcenter_name: self.settings.vcenter_name.clone(),
                vcenter_node,
                instance_uuid: vm.instance_uuid.clone(),
            };

            match sampler::sample_vm(
                api,
                &self.gauges,
                &vm.moref,
                &self.selected,
                self.settings.interval_id,
                &labels,
            )
            .await
            {
                Ok(outcome) => {
                    report.sampled += 1;
                    report.samples.merge(outcome);
                }
                Err(SampleError::Api(e)) if e.is_not_authenticated() => return Err(e),
                Err(SampleError::Api(e)) if e.is_not_found() => {
                    info!("a machine disappeared during processing: {}", vm.name);
                    report.vanished += 1;
                }
                Err(e) => {
                    info!("Sampling {} ({}) failed: {}", vm.name, vm.moref, e);
                    report.failed += 1;
                    self.health.record_sample_failure();
                }
            }
        }

        Ok(report)
    }

    /// Runs one cycle and records its outcome. A lost session is renewed so
    /// the next cycle can proceed.
    pub async fn poll_once(&mut self) -> Option<CycleReport> {
        let start = Instant::now();
        let result = self.run_cycle().await;
        let elapsed = start.elapsed().as_secs_f64();
        self.telemetry.cycle_duration_seconds.set(elapsed);

        match result {
            Ok(report) => {
                self.telemetry.cycle_success.set(1.0);
                self.telemetry.vms_total.set(report.eligible as f64);
                self.telemetry.vms_sampled.set(report.sampled as f64);

                self.health
                    .record_cycle_success(elapsed, report.eligible as u64, report.sampled as u64);
                self.health.record_vanished_vms(report.vanished as u64);
                self.health
                    .record_summary_failures(report.inventory.failed as u64);
                self.health
                    .record_suppressed_samples(report.samples.suppressed as u64);
                self.health
                    .record_unknown_counter_samples(report.samples.unknown_counter as u64);

                info!(
                    "Poll cycle done in {:.2}s: {} VMs listed, {} summary failures, {} eligible, {} sampled, {} vanished, {} failed, {} values set",
                    elapsed,
                    report.inventory.listed,
                    report.inventory.failed,
                    report.eligible,
                    report.sampled,
                    report.vanished,
                    report.failed,
                    report.samples.set
                );
                Some(report)
            }
            Err(e) => {
                self.telemetry.cycle_success.set(0.0);
                self.health.record_cycle_failure(elapsed);

                if e.is_not_authenticated() {
                    warn!("vCenter session lost, logging in again");
                    match self.renew_session().await {
                        Ok(()) => self.health.record_session_renewal(),
                        Err(e) => warn!("Session renewal failed: {}", e),
                    }
                } else {
                    warn!(
                        "Poll cycle failed: {} - retrying in {}s",
                        e,
                        self.settings.interval.as_secs()
                    );
                }
                None
            }
        }
    }

    /// Logs in again and rebuilds everything keyed by counter id.
    async fn renew_session(&mut self) -> Result<(), PollerError> {
        self.api.login().await?;

        let catalog =
            CounterCatalog::discover(self.api.as_ref(), self.settings.counter_level).await?;
        if catalog.is_empty() {
            return Err(PollerError::NoCounters);
        }

        self.gauges.rebind(&catalog)?;
        self.selected = catalog.select(self.settings.vm_metrics.as_deref());
        self.catalog = catalog;
        self.telemetry
            .counters_total
            .set(self.selected.len() as f64);

        info!("Session renewed, sampling {} counters", self.selected.len());
        Ok(())
    }

    /// Polls forever with a fixed sleep between cycles.
    pub async fn run(mut self) {
        info!(
            "Starting poll loop with {}s interval",
            self.settings.interval.as_secs()
        );
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.settings.interval).await;
        }
    }
}
