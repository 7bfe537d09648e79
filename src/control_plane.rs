//! Control-plane client: fetches pending tasks and records outcomes.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ControlPlaneSettings;
use crate::error::{Error, Result};
use crate::retry::{
    RetryNotice, RetryPolicy, Verdict, classify_error, classify_response, retry_request,
};
use crate::tasks::{ResponseReport, StatusReport, Task};

/// One send attempt. `Ok(None)` means the request could not be copied for
/// another try, which ends the retries.
fn classify_attempt(
    result: &std::result::Result<Option<reqwest::Response>, reqwest::Error>,
) -> Verdict {
    match result {
        Ok(Some(response)) => classify_response(response),
        Ok(None) => Verdict::Done,
        Err(e) => classify_error(e),
    }
}

/// Request/response boundary to the campaign backend.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Tasks ready to run, in the order they should run.
    async fn pending_tasks(&self) -> Result<Vec<Task>>;

    async fn report_status(&self, report: &StatusReport) -> Result<()>;

    async fn report_response(&self, report: &ResponseReport) -> Result<()>;

    async fn health(&self) -> Result<()>;
}

/// Success/error envelope used by every route.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
    message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>> {
        if self.success {
            return Ok(self.data);
        }
        let reason = self
            .error
            .or(self.message)
            .unwrap_or_else(|| "request was not successful".to_string());
        Err(Error::ControlPlane(reason))
    }
}

/// `reqwest` client against the `/extension/*` routes.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpControlPlane {
    pub fn new(settings: &ControlPlaneSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("outreach-pilot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: settings.retry.clone(),
        })
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/extension/{}", self.base_url, route)
    }

    async fn send(
        &self,
        route: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let Some(template) = builder.try_clone() else {
            return Ok(builder.send().await?);
        };
        let response = retry_request(
            &self.retry,
            |_attempt| {
                let req = template.try_clone();
                async move {
                    match req {
                        Some(req) => req.send().await.map(Some),
                        None => Ok(None),
                    }
                }
            },
            classify_attempt,
            |RetryNotice {
                 attempt,
                 delay,
                 cause,
             }| {
                warn!(
                    route,
                    attempt,
                    ?delay,
                    cause = cause.label(),
                    "Transient control-plane error, retrying"
                );
            },
        )
        .await?;
        response.ok_or_else(|| Error::ControlPlane(format!("{route}: request cannot be resent")))
    }

    async fn decode<T: DeserializeOwned>(
        route: &'static str,
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ApiResponse<T>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(e) if status.is_success() => Err(Error::ControlPlane(format!(
                "{route}: malformed response: {e}"
            ))),
            Err(_) => Err(Error::ControlPlane(format!("{route}: HTTP {status}"))),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn pending_tasks(&self) -> Result<Vec<Task>> {
        let route = "pending-tasks";
        let response = self
            .send(route, self.client.get(self.endpoint(route)))
            .await?;
        let tasks = Self::decode::<Vec<Task>>(route, response)
            .await?
            .unwrap_or_default();
        debug!(count = tasks.len(), "Fetched pending tasks");
        Ok(tasks)
    }

    async fn report_status(&self, report: &StatusReport) -> Result<()> {
        let route = "update-status";
        let response = self
            .send(route, self.client.post(self.endpoint(route)).json(report))
            .await?;
        Self::decode::<serde_json::Value>(route, response).await?;
        Ok(())
    }

    async fn report_response(&self, report: &ResponseReport) -> Result<()> {
        let route = "update-response";
        let response = self
            .send(route, self.client.post(self.endpoint(route)).json(report))
            .await?;
        Self::decode::<serde_json::Value>(route, response).await?;
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        let route = "health";
        let response = self
            .send(route, self.client.get(self.endpoint(route)))
            .await?;
        Self::decode::<serde_json::Value>(route, response).await?;
        Ok(())
    }
}

/// In-memory control plane that behaves like the backend: reported tasks
/// leave the pending listing.
#[derive(Default)]
pub struct MemoryControlPlane {
    pending: Mutex<Vec<Task>>,
    statuses: Mutex<Vec<StatusReport>>,
    responses: Mutex<Vec<ResponseReport>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryControlPlane {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            pending: Mutex::new(tasks),
            ..Default::default()
        }
    }

    pub async fn add_tasks(&self, tasks: impl IntoIterator<Item = Task>) {
        self.pending.lock().await.extend(tasks);
    }

    /// Make every call fail until set back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn statuses(&self) -> Vec<StatusReport> {
        self.statuses.lock().await.clone()
    }

    pub async fn responses(&self) -> Vec<ResponseReport> {
        self.responses.lock().await.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::ControlPlane("control plane unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn pending_tasks(&self) -> Result<Vec<Task>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.pending.lock().await.clone())
    }

    async fn report_status(&self, report: &StatusReport) -> Result<()> {
        self.check_online()?;
        self.pending.lock().await.retain(|t| {
            !(t.campaign_id == report.campaign_id && t.target_url == report.profile_url)
        });
        self.statuses.lock().await.push(report.clone());
        Ok(())
    }

    async fn report_response(&self, report: &ResponseReport) -> Result<()> {
        self.check_online()?;
        self.responses.lock().await.push(report.clone());
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::Outcome;

    fn task(slug: &str) -> Task {
        Task {
            campaign_id: "c1".into(),
            campaign_container_id: "sheet-1".into(),
            target_url: format!("https://www.linkedin.com/in/{slug}/"),
            personalized_text: String::new(),
            template_index: 0,
        }
    }

    #[test]
    fn envelope_failure_carries_error_text() {
        let env: ApiResponse<Vec<Task>> =
            serde_json::from_str(r#"{"success": false, "error": "Campaign not found"}"#).unwrap();
        match env.into_result() {
            Err(Error::ControlPlane(msg)) => assert_eq!(msg, "Campaign not found"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn envelope_success_without_data_is_empty() {
        let env: ApiResponse<Vec<Task>> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), None);
    }

    #[test]
    fn endpoints_hang_off_the_extension_prefix() {
        let plane = HttpControlPlane::new(&ControlPlaneSettings {
            base_url: "http://localhost:3001/api/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            plane.endpoint("pending-tasks"),
            "http://localhost:3001/api/extension/pending-tasks"
        );
    }

    #[tokio::test]
    async fn request_that_cannot_be_copied_is_sent_once() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let mut sent = 0;
        let result = retry_request(
            &policy,
            |_| {
                sent += 1;
                async { Ok(None) }
            },
            classify_attempt,
            |_| panic!("no retry expected"),
        )
        .await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn memory_plane_drops_reported_tasks() {
        let plane = MemoryControlPlane::new(vec![task("a"), task("b")]);
        let first = plane.pending_tasks().await.unwrap();
        assert_eq!(first.len(), 2);

        let report = StatusReport::for_outcome(&first[0], &Outcome::success());
        plane.report_status(&report).await.unwrap();
        assert_eq!(plane.pending_tasks().await.unwrap(), vec![task("b")]);
        assert_eq!(plane.fetch_count(), 2);

        plane.set_offline(true);
        assert!(plane.pending_tasks().await.is_err());
    }
}
