//! Inventory enumeration.
//!
//! Lists hosts and powered-on, annotated VMs once per cycle. Objects may vanish
//! between the listing and the per-object detail fetch; those are dropped from
//! the cycle instead of failing it.

use ahash::AHashMap as HashMap;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::annotation::AnnotationFilter;
use crate::vsphere::{ApiError, ManagementApi, MoRef, ObjectKind, PowerState};

/// A VM eligible for sampling this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct VmRecord {
    pub moref: MoRef,
    pub name: String,
    pub annotation: String,
    pub instance_uuid: String,
    pub host: Option<MoRef>,
}

/// What one enumeration pass saw, for logging and health statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryCounts {
    pub listed: usize,
    pub vanished: usize,
    pub failed: usize,
    pub not_running: usize,
    pub unmanaged: usize,
}

/// Cosmetic shortening of vcenter and host names used as label values.
#[derive(Debug, Clone, Default)]
pub struct NameShortener {
    pattern: Option<Regex>,
}

impl NameShortener {
    pub fn new(pattern: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.map(Regex::new).transpose()?,
        })
    }

    pub fn shorten(&self, name: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(name, "").into_owned(),
            None => name.to_string(),
        }
    }
}

/// Maps host references to (shortened) host names. Hosts whose name cannot
/// be read are left out; VMs on them get an empty node label.
#[instrument(skip_all)]
pub async fn list_hosts<A>(
    api: &A,
    shortener: &NameShortener,
) -> Result<HashMap<MoRef, String>, ApiError>
where
    A: ManagementApi + ?Sized,
{
    let hosts = api.list_objects(ObjectKind::HostSystem).await?;
    let mut names = HashMap::with_capacity(hosts.len());

    for host in hosts {
        match api.host_name(&host).await {
            Ok(name) => {
                names.insert(host, shortener.shorten(&name));
            }
            Err(e) if e.is_not_found() => {
                info!("Host {} disappeared during enumeration", host);
            }
            Err(e) => {
                warn!("Failed to read name of host {}: {}", host, e);
            }
        }
    }

    debug!("Enumerated {} hosts", names.len());
    Ok(names)
}

/// Lists VMs that are powered on and carry a managed annotation.
///
/// Only the listing itself can fail the call. Session loss while fetching a
/// VM is propagated too since every later call would fail the same way.
#[instrument(skip_all)]
pub async fn list_running_annotated_vms<A>(
    api: &A,
    filter: &AnnotationFilter,
) -> Result<(Vec<VmRecord>, InventoryCounts), ApiError>
where
    A: ManagementApi + ?Sized,
{
    let vms = api.list_objects(ObjectKind::VirtualMachine).await?;
    let mut counts = InventoryCounts {
        listed: vms.len(),
        ..InventoryCounts::default()
    };
    info!("number of vms - {}", vms.len());

    let mut records = Vec::new();
    for vm in vms {
        let summary = match api.vm_summary(&vm).await {
            Ok(summary) => summary,
            Err(e) if e.is_not_found() => {
                info!("a machine disappeared during processing: {}", vm);
                counts.vanished += 1;
                continue;
            }
            Err(e) if e.is_not_authenticated() => return Err(e),
            Err(e) => {
                warn!("Failed to fetch summary of {}: {}", vm, e);
                counts.failed += 1;
                continue;
            }
        };

        if summary.power_state != PowerState::PoweredOn {
            counts.not_running += 1;
            continue;
        }

        let annotation = match summary.annotation {
            Some(text) if filter.is_managed(&text) => text,
            _ => {
                debug!("Skipping {} ({}): no managed annotation", summary.name, vm);
                counts.unmanaged += 1;
                continue;
            }
        };

        records.push(VmRecord {
            moref: vm,
            name: summary.name,
            annotation,
            instance_uuid: summary.instance_uuid.unwrap_or_default(),
            host: summary.host,
        });
    }

    Ok((records, counts))
}
