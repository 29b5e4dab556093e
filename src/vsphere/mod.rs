//! vSphere management API boundary.
//!
//! The exporter core only talks to [`ManagementApi`]. [`VsphereClient`] is the
//! production implementation over the VI/JSON HTTP API; tests provide their
//! own in-memory implementation.

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::VsphereClient;
pub use types::{
    Counter, EntityMetric, MetricId, MetricSeries, MoRef, ObjectKind, PerfQuerySpec, PowerState,
    VmSummary,
};

/// Errors returned by management API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The referenced object no longer exists (deleted or migrated away
    /// between two calls).
    #[error("managed object not found: {0}")]
    NotFound(String),

    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("vSphere fault {fault}: {message}")]
    Fault { fault: String, message: String },

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated)
    }
}

/// Operations the exporter needs from the management API.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Opens (or reopens) the session.
    async fn login(&self) -> Result<(), ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;

    /// Counter metadata up to the given collection level (4 = all).
    async fn query_counters(&self, level: i32) -> Result<Vec<Counter>, ApiError>;

    /// Recursive listing of every object of `kind` below the root folder.
    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<MoRef>, ApiError>;

    async fn host_name(&self, host: &MoRef) -> Result<String, ApiError>;

    async fn vm_summary(&self, vm: &MoRef) -> Result<VmSummary, ApiError>;

    /// Batched stats query; one result entry per entity that returned data.
    async fn query_perf(&self, specs: &[PerfQuerySpec]) -> Result<Vec<EntityMetric>, ApiError>;
}
