//! VI/JSON client for vCenter.
//!
//! Every managed object method is a `POST {base}/{type}/{id}/{method}` and
//! every property read a `GET {base}/{type}/{id}/{property}`, where
//! `base = https://{host}:{port}/sdk/vim25/{release}`. The session id handed
//! out by `SessionManager.Login` travels in the `vmware-api-session-id`
//! header.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::types::{
    Counter, EntityMetric, FaultBody, MoRef, ObjectKind, PerfCounterInfo, PerfQuerySpec,
    ServiceContent, VirtualMachineSummary, VmSummary,
};
use super::{ApiError, ManagementApi};
use crate::config::MainConfig;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// vCenter client holding one authenticated session.
pub struct VsphereClient {
    http: Client,
    base_url: String,
    user: String,
    password: String,
    session: RwLock<Option<String>>,
    content: RwLock<Option<ServiceContent>>,
}

impl VsphereClient {
    /// Builds the client from the `main` config section. Does not connect.
    pub fn new(cfg: &MainConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(cfg.ignore_ssl())
            .timeout(Duration::from_secs(cfg.request_timeout()))
            .build()?;

        let base_url = format!(
            "https://{}:{}/sdk/vim25/{}",
            cfg.host(),
            cfg.port(),
            cfg.api_release()
        );
        debug!("vSphere endpoint: {}", base_url);

        Ok(Self {
            http,
            base_url,
            user: cfg.user.clone().unwrap_or_default(),
            password: cfg.password.clone().unwrap_or_default(),
            session: RwLock::new(None),
            content: RwLock::new(None),
        })
    }

    fn url(&self, mo: &MoRef, tail: &str) -> String {
        format!("{}/{}/{}/{}", self.base_url, mo.kind, mo.value, tail)
    }

    fn session_id(&self) -> Option<String> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    fn service_content(&self) -> Result<ServiceContent, ApiError> {
        self.content
            .read()
            .ok()
            .and_then(|c| c.clone())
            .ok_or(ApiError::NotAuthenticated)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session_id() {
            Some(id) => request.header(SESSION_HEADER, id),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, mo: &MoRef, property: &str) -> Result<T, ApiError> {
        let request = self.authorize(self.http.get(self.url(mo, property)));
        let response = check(request.send().await?).await?;
        decode(&response.bytes().await?)
    }

    async fn invoke<B, T>(&self, mo: &MoRef, method: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.http.post(self.url(mo, method)).json(body));
        let response = check(request.send().await?).await?;
        decode(&response.bytes().await?)
    }

    async fn invoke_void<B>(&self, mo: &MoRef, method: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let request = self.authorize(self.http.post(self.url(mo, method)).json(body));
        check(request.send().await?).await?;
        Ok(())
    }
}

/// Passes successful responses through and turns everything else into an
/// [`ApiError`], using the fault type from the body when there is one.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(fault_from_body(status.as_u16(), &body))
}

fn fault_from_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<FaultBody>(body) {
        Ok(fault) => match fault.type_name.as_str() {
            "ManagedObjectNotFound" => ApiError::NotFound(fault.message()),
            "NotAuthenticated" => ApiError::NotAuthenticated,
            "InvalidLogin" | "NoPermission" => ApiError::LoginFailed(fault.message()),
            _ => ApiError::Fault {
                message: fault.message(),
                fault: fault.type_name,
            },
        },
        Err(_) => match status {
            401 => ApiError::NotAuthenticated,
            404 => ApiError::NotFound(body.to_string()),
            _ => ApiError::Status {
                status,
                body: body.to_string(),
            },
        },
    }
}

/// Void-ish methods answer with an empty body; treat that as JSON `null`.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let result = if bytes.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_str("null")
    } else {
        serde_json::from_slice(bytes)
    };
    result.map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl ManagementApi for VsphereClient {
    #[instrument(skip(self))]
    async fn login(&self) -> Result<(), ApiError> {
        let url = format!("{}/ServiceInstance/ServiceInstance/content", self.base_url);
        let response = check(self.http.get(url).send().await?).await?;
        let content: ServiceContent = decode(&response.bytes().await?)?;

        let login_url = self.url(&content.session_manager, "Login");
        let response = self
            .http
            .post(login_url)
            .json(&json!({ "userName": self.user, "password": self.password }))
            .send()
            .await?;
        let response = check(response).await.map_err(|e| match e {
            ApiError::Fault { message, .. } => ApiError::LoginFailed(message),
            other => other,
        })?;

        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::LoginFailed("login response carried no session id".into()))?;

        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
        if let Ok(mut guard) = self.content.write() {
            *guard = Some(content);
        }

        info!("Logged in to {} as {}", self.base_url, self.user);
        Ok(())
    }

    async fn logout(&self) -> Result<(), ApiError> {
        if self.session_id().is_none() {
            return Ok(());
        }
        let content = self.service_content()?;
        let result = self
            .invoke_void(&content.session_manager, "Logout", &json!({}))
            .await;
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
        result
    }

    async fn query_counters(&self, level: i32) -> Result<Vec<Counter>, ApiError> {
        let content = self.service_content()?;
        let infos: Option<Vec<PerfCounterInfo>> = self
            .invoke(
                &content.perf_manager,
                "QueryPerfCounterByLevel",
                &json!({ "level": level }),
            )
            .await?;
        Ok(infos
            .unwrap_or_default()
            .into_iter()
            .map(Counter::from)
            .collect())
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<MoRef>, ApiError> {
        let content = self.service_content()?;
        let view: MoRef = self
            .invoke(
                &content.view_manager,
                "CreateContainerView",
                &json!({
                    "container": content.root_folder,
                    "type": [kind.as_str()],
                    "recursive": true,
                }),
            )
            .await?;

        let objects: Result<Option<Vec<MoRef>>, ApiError> = self.get(&view, "view").await;

        if let Err(e) = self.invoke_void(&view, "DestroyView", &json!({})).await {
            debug!("Failed to destroy container view {}: {}", view, e);
        }

        Ok(objects?.unwrap_or_default())
    }

    async fn host_name(&self, host: &MoRef) -> Result<String, ApiError> {
        self.get(host, "name").await
    }

    async fn vm_summary(&self, vm: &MoRef) -> Result<VmSummary, ApiError> {
        let summary: VirtualMachineSummary = self.get(vm, "summary").await?;
        Ok(summary.into())
    }

    async fn query_perf(&self, specs: &[PerfQuerySpec]) -> Result<Vec<EntityMetric>, ApiError> {
        let content = self.service_content()?;
        let query_spec: Vec<serde_json::Value> = specs
            .iter()
            .map(|spec| {
                let metric_ids: Vec<serde_json::Value> = spec
                    .metric_ids
                    .iter()
                    .map(|m| {
                        json!({
                            "_typeName": "PerfMetricId",
                            "counterId": m.counter_id,
                            "instance": m.instance,
                        })
                    })
                    .collect();
                json!({
                    "_typeName": "PerfQuerySpec",
                    "entity": spec.entity,
                    "maxSample": spec.max_sample,
                    "metricId": metric_ids,
                    "intervalId": spec.interval_id,
                })
            })
            .collect();

        let result: Option<Vec<EntityMetric>> = self
            .invoke(
                &content.perf_manager,
                "QueryPerf",
                &json!({ "querySpec": query_spec }),
            )
            .await?;
        Ok(result.unwrap_or_default())
    }
}
