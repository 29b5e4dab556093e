//! Data types exchanged with the vSphere management API.
//!
//! Wire structs mirror the VI/JSON encoding (camelCase fields, `_typeName`
//! discriminators on data objects). Domain structs are what the rest of the
//! exporter works with.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Reference to a managed object, e.g. `VirtualMachine:vm-42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct MoRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl MoRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for MoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

impl Serialize for MoRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ManagedObjectReference", 3)?;
        s.serialize_field("_typeName", "ManagedObjectReference")?;
        s.serialize_field("type", &self.kind)?;
        s.serialize_field("value", &self.value)?;
        s.end()
    }
}

/// Managed object kinds the exporter lists through container views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    VirtualMachine,
    HostSystem,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::VirtualMachine => "VirtualMachine",
            ObjectKind::HostSystem => "HostSystem",
        }
    }
}

/// One performance counter type as exposed by the performance manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    pub key: i32,
    pub group: String,
    pub name: String,
    pub rollup: String,
    pub summary: Option<String>,
}

impl Counter {
    pub fn new(key: i32, group: &str, name: &str, rollup: &str) -> Self {
        Self {
            key,
            group: group.to_string(),
            name: name.to_string(),
            rollup: rollup.to_string(),
            summary: None,
        }
    }

    /// `group.name.rollup`, e.g. `cpu.usagemhz.average`.
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.group, self.name, self.rollup)
    }
}

/// VM power state; anything the exporter does not know maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    #[serde(other)]
    Unknown,
}

/// The subset of a VM summary the exporter needs.
#[derive(Debug, Clone, PartialEq)]
pub struct VmSummary {
    pub name: String,
    pub power_state: PowerState,
    pub annotation: Option<String>,
    pub instance_uuid: Option<String>,
    pub host: Option<MoRef>,
}

/// Counter/instance pair of a stats query. `*` as instance selects the
/// aggregate and every sub-device instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricId {
    pub counter_id: i32,
    #[serde(default)]
    pub instance: String,
}

impl MetricId {
    pub fn wildcard(counter_id: i32) -> Self {
        Self {
            counter_id,
            instance: "*".to_string(),
        }
    }
}

/// A single-entity stats query.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfQuerySpec {
    pub entity: MoRef,
    pub metric_ids: Vec<MetricId>,
    pub max_sample: i32,
    pub interval_id: i32,
}

/// One returned series; with `max_sample = 1` it carries at most one value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSeries {
    pub id: MetricId,
    #[serde(default)]
    pub value: Vec<i64>,
}

/// Stats returned for one entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityMetric {
    pub entity: Option<MoRef>,
    #[serde(default)]
    pub value: Vec<MetricSeries>,
}

// ---------------------------------------------------------------------------
// VI/JSON wire structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServiceContent {
    pub root_folder: MoRef,
    pub perf_manager: MoRef,
    pub view_manager: MoRef,
    pub session_manager: MoRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ElementDescription {
    pub key: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PerfCounterInfo {
    pub key: i32,
    pub name_info: ElementDescription,
    pub group_info: ElementDescription,
    pub rollup_type: String,
}

impl From<PerfCounterInfo> for Counter {
    fn from(info: PerfCounterInfo) -> Self {
        Counter {
            key: info.key,
            group: info.group_info.key,
            name: info.name_info.key,
            rollup: info.rollup_type,
            summary: info.name_info.summary.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VmConfigSummary {
    #[serde(default)]
    pub name: String,
    pub annotation: Option<String>,
    pub instance_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VmRuntimeInfo {
    pub power_state: PowerState,
    pub host: Option<MoRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VirtualMachineSummary {
    #[serde(default)]
    pub config: Option<VmConfigSummary>,
    pub runtime: VmRuntimeInfo,
}

impl From<VirtualMachineSummary> for VmSummary {
    fn from(summary: VirtualMachineSummary) -> Self {
        let config = summary.config.unwrap_or_default();
        VmSummary {
            name: config.name,
            power_state: summary.runtime.power_state,
            annotation: config.annotation,
            instance_uuid: config.instance_uuid,
            host: summary.runtime.host,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocalizableMessage {
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of a failed VI/JSON call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FaultBody {
    #[serde(rename = "_typeName")]
    pub type_name: String,
    #[serde(default)]
    pub fault_message: Vec<LocalizableMessage>,
}

impl FaultBody {
    pub fn message(&self) -> String {
        let parts: Vec<&str> = self
            .fault_message
            .iter()
            .filter_map(|m| m.message.as_deref())
            .collect();
        if parts.is_empty() {
            self.type_name.clone()
        } else {
            parts.join("; ")
        }
    }
}
