//! vCenter VM performance exporter.
//!
//! Polls a vCenter for the latest performance samples of powered-on virtual
//! machines that carry an ownership annotation and republishes them as
//! Prometheus gauges.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use prometheus::Registry;
//! use vcenter_exporter::annotation::AnnotationFilter;
//! use vcenter_exporter::config::MainConfig;
//! use vcenter_exporter::health_stats::HealthStats;
//! use vcenter_exporter::inventory::NameShortener;
//! use vcenter_exporter::poller::{Poller, PollerSettings};
//! use vcenter_exporter::vsphere::{ManagementApi, VsphereClient};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = MainConfig::default();
//! let api = Arc::new(VsphereClient::new(&cfg)?);
//! api.login().await?;
//!
//! let shortener = NameShortener::new(cfg.strip_pattern.as_deref())?;
//! let poller = Poller::start(
//!     api,
//!     PollerSettings::from_config(&cfg, &shortener),
//!     AnnotationFilter::new(cfg.annotation_marker())?,
//!     shortener,
//!     Registry::new(),
//!     Arc::new(HealthStats::new()),
//! )
//! .await?;
//! poller.run().await;
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod gauges;
pub mod handlers;
pub mod health_stats;
pub mod inventory;
pub mod metrics;
pub mod poller;
pub mod sampler;
pub mod state;
pub mod vsphere;

pub use poller::{Poller, PollerSettings};
pub use vsphere::{ApiError, ManagementApi, VsphereClient};
