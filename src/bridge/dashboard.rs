//! Loopback HTTP bridge for the companion dashboard.
//!
//! Presence handshake, "check now" round-trip, activity log, queue status.

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warp::Filter;
use warp::http::StatusCode;

use super::messages::{Envelope, Message};
use crate::config::DashboardSettings;
use crate::error::{Error, Result};
use crate::store::{QueueState, TaskStore};
use crate::tasks::CampaignStats;

/// Shared state behind every route.
#[derive(Clone)]
pub struct DashboardState {
    pub store: TaskStore,
    pub controller: mpsc::Sender<Envelope>,
    pub ack_timeout: Duration,
}

/// Queue view returned by `GET /bridge/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub version: u64,
    pub pending: usize,
    pub current_task: Option<String>,
    pub active_page: Option<String>,
    pub campaigns: BTreeMap<String, CampaignView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    #[serde(flatten)]
    pub stats: CampaignStats,
    pub acceptance_rate: f64,
}

impl From<&QueueState> for StatusView {
    fn from(state: &QueueState) -> Self {
        Self {
            version: state.version,
            pending: state.pending_tasks.len(),
            current_task: state.current_task.as_ref().map(|t| t.label()),
            active_page: state.active_page.as_ref().map(ToString::to_string),
            campaigns: state
                .campaign_stats
                .iter()
                .map(|(id, stats)| {
                    (
                        id.clone(),
                        CampaignView {
                            stats: stats.clone(),
                            acceptance_rate: stats.acceptance_rate(),
                        },
                    )
                })
                .collect(),
        }
    }
}

fn with_state(
    state: DashboardState,
) -> impl Filter<Extract = (DashboardState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All dashboard routes under `/bridge`.
pub fn routes(
    state: DashboardState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let hello = warp::path!("bridge" / "hello").and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "type": "EXTENSION_CONNECTED",
            "version": env!("CARGO_PKG_VERSION"),
        }))
    });

    let check = warp::path!("bridge" / "check")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(handle_check);

    let logs = warp::path!("bridge" / "logs")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_logs);

    let clear = warp::path!("bridge" / "logs" / "clear")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(handle_clear);

    let status = warp::path!("bridge" / "status")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_status);

    hello.or(check).or(logs).or(clear).or(status)
}

/// Forward `message` to the controller and wait for its ack.
async fn round_trip(state: &DashboardState, message: Message) -> bool {
    let (envelope, reply) = Envelope::request(message);
    if state.controller.send(envelope).await.is_err() {
        warn!("Controller inbox closed");
        return false;
    }
    matches!(
        tokio::time::timeout(state.ack_timeout, reply).await,
        Ok(Ok(_))
    )
}

async fn handle_check(state: DashboardState) -> std::result::Result<impl warp::Reply, Infallible> {
    if round_trip(&state, Message::CheckNow).await {
        Ok(warp::reply::with_status(
            warp::reply::json(&json!({"type": "EXTENSION_CHECK_TRIGGERED"})),
            StatusCode::OK,
        ))
    } else {
        warn!("Check-now was not acknowledged in time");
        Ok(warp::reply::with_status(
            warp::reply::json(&json!({"type": "EXTENSION_CHECK_TIMEOUT"})),
            StatusCode::GATEWAY_TIMEOUT,
        ))
    }
}

async fn handle_clear(state: DashboardState) -> std::result::Result<impl warp::Reply, Infallible> {
    let ok = round_trip(&state, Message::ClearLogs).await;
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::GATEWAY_TIMEOUT
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({"success": ok})),
        status,
    ))
}

async fn handle_logs(state: DashboardState) -> std::result::Result<impl warp::Reply, Infallible> {
    Ok(match state.store.logs().await {
        Ok(entries) => warp::reply::with_status(warp::reply::json(&entries), StatusCode::OK),
        Err(e) => internal_error(e),
    })
}

async fn handle_status(state: DashboardState) -> std::result::Result<impl warp::Reply, Infallible> {
    Ok(match state.store.snapshot().await {
        Ok(queue) => {
            warp::reply::with_status(warp::reply::json(&StatusView::from(&queue)), StatusCode::OK)
        }
        Err(e) => internal_error(e),
    })
}

fn internal_error(e: Error) -> warp::reply::WithStatus<warp::reply::Json> {
    warn!(error = %e, "Dashboard request failed");
    warp::reply::with_status(
        warp::reply::json(&json!({"error": e.to_string()})),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

/// Serve the dashboard bridge until `cancel` fires.
pub async fn serve(
    settings: &DashboardSettings,
    state: DashboardState,
    cancel: CancellationToken,
) -> Result<()> {
    let (addr, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(settings.bind, async move {
            cancel.cancelled().await;
        })
        .map_err(|e| Error::Io(std::io::Error::other(format!("dashboard bind: {e}"))))?;
    info!(%addr, "Dashboard bridge listening");
    server.await;
    info!("Dashboard bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::messages::Reply;
    use crate::store::{LogEntry, Severity};

    fn state(store: TaskStore, timeout_ms: u64) -> (DashboardState, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(8);
        (
            DashboardState {
                store,
                controller: tx,
                ack_timeout: Duration::from_millis(timeout_ms),
            },
            rx,
        )
    }

    #[tokio::test]
    async fn hello_advertises_presence() {
        let (state, _rx) = state(TaskStore::open_in_memory(50).unwrap(), 100);
        let res = warp::test::request()
            .method("GET")
            .path("/bridge/hello")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["type"], "EXTENSION_CONNECTED");
    }

    #[tokio::test]
    async fn check_is_acknowledged() {
        let (state, mut rx) = state(TaskStore::open_in_memory(50).unwrap(), 1000);
        tokio::spawn(async move {
            let mut env = rx.recv().await.unwrap();
            assert_eq!(env.message, Message::CheckNow);
            env.respond(Reply::ok());
        });
        let res = warp::test::request()
            .method("POST")
            .path("/bridge/check")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["type"], "EXTENSION_CHECK_TRIGGERED");
    }

    #[tokio::test]
    async fn unanswered_check_times_out() {
        let (state, _rx) = state(TaskStore::open_in_memory(50).unwrap(), 20);
        let res = warp::test::request()
            .method("POST")
            .path("/bridge/check")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["type"], "EXTENSION_CHECK_TIMEOUT");
    }

    #[tokio::test]
    async fn logs_are_newest_first() {
        let store = TaskStore::open_in_memory(50).unwrap();
        store
            .append_log(LogEntry::new("first", Severity::Info))
            .await
            .unwrap();
        store
            .append_log(LogEntry::new("second", Severity::Success))
            .await
            .unwrap();
        let (state, _rx) = state(store, 100);
        let res = warp::test::request()
            .method("GET")
            .path("/bridge/logs")
            .reply(&routes(state))
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body[0]["message"], "second");
        assert_eq!(body[1]["type"], "info");
    }

    #[tokio::test]
    async fn status_reports_queue_and_counters() {
        let store = TaskStore::open_in_memory(50).unwrap();
        store
            .update(|state| {
                let stats = state.campaign_stats.entry("c1".into()).or_default();
                stats.sent = 4;
                stats.accepted = 1;
            })
            .await
            .unwrap();
        let (state, _rx) = state(store, 100);
        let res = warp::test::request()
            .method("GET")
            .path("/bridge/status")
            .reply(&routes(state))
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["pending"], 0);
        assert!(body["currentTask"].is_null());
        assert_eq!(body["campaigns"]["c1"]["sent"], 4);
        assert_eq!(body["campaigns"]["c1"]["acceptanceRate"], 25.0);
    }
}
