//! Queue/lifecycle controller.
//!
//! A single actor owns the queue: it refills from the control plane on a
//! timer or on demand, opens one page per task, dispatches the run once the
//! page has loaded, records the outcome and paces the next task. Nothing
//! else mutates queue state.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{Envelope, Message, PageContext, PageContextHandle, Reply};
use crate::config::{AutomationSettings, Config, QueueSettings};
use crate::control_plane::ControlPlane;
use crate::error::Result;
use crate::heuristics::SiteProfile;
use crate::page::{BrowserHost, PageEvent, PageHandle};
use crate::store::{LogEntry, Severity, TaskStore};
use crate::tasks::{FailureReason, Outcome, StatusReport, Task, is_profile_url};

const INBOX_CAPACITY: usize = 256;

/// Uniform pause between tasks, inside the configured window.
pub fn pacing_delay(queue: &QueueSettings) -> Duration {
    let (min, max) = queue.pacing_window();
    let low = min.as_millis() as u64;
    let high = (max.as_millis() as u64).max(low);
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

fn acknowledge(reply: Option<oneshot::Sender<Reply>>) {
    if let Some(tx) = reply {
        let _ = tx.send(Reply::ok());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub struct Controller {
    store: TaskStore,
    plane: Arc<dyn ControlPlane>,
    host: Arc<dyn BrowserHost>,
    queue: QueueSettings,
    automation: AutomationSettings,
    profile: SiteProfile,
    inbox_tx: mpsc::Sender<Envelope>,
    inbox: mpsc::Receiver<Envelope>,
    events: broadcast::Receiver<PageEvent>,
    poll: Interval,
    context: Option<PageContextHandle>,
    dispatch_at: Option<Instant>,
    advance_at: Option<Instant>,
}

impl Controller {
    pub fn new(
        store: TaskStore,
        plane: Arc<dyn ControlPlane>,
        host: Arc<dyn BrowserHost>,
        config: &Config,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let events = host.subscribe();
        let mut poll = tokio::time::interval(config.queue.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            store,
            plane,
            host,
            queue: config.queue.clone(),
            automation: config.automation.clone(),
            profile: config.site.clone(),
            inbox_tx,
            inbox,
            events,
            poll,
            context: None,
            dispatch_at: None,
            advance_at: None,
        }
    }

    /// Sender for dashboard and page-context messages.
    pub fn sender(&self) -> mpsc::Sender<Envelope> {
        self.inbox_tx.clone()
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Time left until the paced `advance`, if one is scheduled.
    pub fn next_advance_in(&self) -> Option<Duration> {
        self.advance_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.recover().await?;
        info!("Controller started");
        while self.turn(&cancel).await {}
        if let Some(context) = self.context.take() {
            context.shutdown();
        }
        info!("Controller stopped");
        Ok(())
    }

    /// Wait for the next wakeup and handle it. Returns `false` once the
    /// controller should stop.
    pub async fn turn(&mut self, cancel: &CancellationToken) -> bool {
        let handled = tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = self.poll.tick() => self.check().await,
            Some(envelope) = self.inbox.recv() => self.handle_envelope(envelope).await,
            event = self.events.recv() => match event {
                Ok(event) => self.handle_page_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Page events lagged");
                    Ok(())
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Page host went away");
                    return false;
                }
            },
            _ = wait_until(self.dispatch_at) => {
                self.dispatch_at = None;
                self.dispatch().await
            }
            _ = wait_until(self.advance_at) => {
                self.advance_at = None;
                self.advance().await.map(|_| ())
            }
        };
        if let Err(e) = handled {
            warn!(error = %e, "Controller step failed");
        }
        true
    }

    /// Append to the activity log and mirror it to tracing.
    async fn activity(&self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        match severity {
            Severity::Error => warn!(target: "outreach_pilot::activity", "{message}"),
            _ => info!(target: "outreach_pilot::activity", ?severity, "{message}"),
        }
        if let Err(e) = self.store.append_log(LogEntry::new(message, severity)).await {
            warn!(error = %e, "Failed to persist activity entry");
        }
    }

    /// Settle a task left in flight by a previous process.
    ///
    /// A page the host still knows is dispatched again; otherwise the task
    /// is dropped without a report, since its outcome is unknown.
    pub async fn recover(&mut self) -> Result<()> {
        let state = self.store.snapshot().await?;
        let (Some(task), Some(page)) = (state.current_task, state.active_page) else {
            return Ok(());
        };

        if self.host.has_page(&page).await {
            info!(task = %task.key(), %page, "Resuming in-flight task");
            self.store
                .update(|s| s.dispatch_guard = Some(page.clone()))
                .await?;
            self.dispatch_at = Some(Instant::now());
            return Ok(());
        }

        warn!(task = %task.key(), %page, "Dropping in-flight task from a previous session");
        self.store
            .update(|s| {
                s.finish_current();
            })
            .await?;
        self.activity(
            format!(
                "⚠️ Dropped unfinished task for {} from a previous session; its result is unknown",
                task.label()
            ),
            Severity::Error,
        )
        .await;
        Ok(())
    }

    /// Refill, then advance.
    pub async fn check(&mut self) -> Result<()> {
        self.refill().await?;
        self.advance().await?;
        Ok(())
    }

    /// Replace the pending queue with the control plane's listing. An error
    /// or an empty listing leaves the queue untouched.
    pub async fn refill(&mut self) -> Result<usize> {
        self.activity("🔍 Checking for pending tasks...", Severity::Info)
            .await;
        let tasks = match self.plane.pending_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                self.activity(format!("❌ Error checking tasks: {e}"), Severity::Error)
                    .await;
                return Ok(0);
            }
        };
        if tasks.is_empty() {
            self.activity("No pending tasks found", Severity::Info).await;
            return Ok(0);
        }

        for task in tasks.iter().filter(|t| !is_profile_url(&t.target_url)) {
            warn!(task = %task.key(), "Task URL is not a recognised profile URL");
        }
        let count = self.store.update(move |s| s.replace_pending(tasks)).await?;
        self.activity(format!("✅ Found {count} pending tasks"), Severity::Success)
            .await;
        Ok(count)
    }

    /// Start the head task unless one is already in flight.
    pub async fn advance(&mut self) -> Result<Option<Task>> {
        let state = self.store.snapshot().await?;
        if state.is_busy() {
            self.activity("Already processing a task, waiting...", Severity::Info)
                .await;
            return Ok(None);
        }
        let Some(head) = state.pending_tasks.front().cloned() else {
            self.activity("✅ All tasks completed!", Severity::Success)
                .await;
            return Ok(None);
        };

        self.activity(format!("🚀 Opening profile: {}", head.label()), Severity::Action)
            .await;
        let page = match self.host.open_page(&head.target_url).await {
            Ok(page) => page,
            Err(e) => {
                self.activity(format!("❌ Could not open page: {e}"), Severity::Error)
                    .await;
                return Ok(None);
            }
        };

        let opened = page.clone();
        let started = self.store.update(move |s| s.begin_next(opened)).await?;
        match started {
            Some(task) => {
                self.advance_at = None;
                self.dispatch_at = None;
                debug!(task = %task.key(), %page, "Task in flight");
                Ok(Some(task))
            }
            None => {
                self.host.close_page(&page).await?;
                Ok(None)
            }
        }
    }

    pub async fn handle_page_event(&mut self, event: PageEvent) -> Result<()> {
        let state = self.store.snapshot().await?;
        let is_active = state.active_page.as_ref() == Some(event.handle());
        if !is_active || state.current_task.is_none() {
            return Ok(());
        }

        match event {
            PageEvent::LoadComplete(page) => {
                if state.dispatch_guard.as_ref() == Some(&page) {
                    // A load after dispatch is a navigation: the running
                    // context reports its run as a page error.
                    match self.context.take() {
                        Some(context) => {
                            warn!(%page, "Page navigated during the run, abandoning it");
                            context.shutdown();
                        }
                        None => debug!(%page, "Task already dispatched to this page, ignoring load"),
                    }
                    return Ok(());
                }
                let guarded = page.clone();
                self.store
                    .update(move |s| s.dispatch_guard = Some(guarded))
                    .await?;
                self.activity("📄 Profile page loaded, starting automation...", Severity::Info)
                    .await;
                self.dispatch_at = Some(Instant::now() + self.queue.dispatch_settle);
                Ok(())
            }
            PageEvent::Closed(page) => {
                warn!(%page, "Active page closed before the run finished");
                self.context = None;
                self.complete(Outcome::failed(FailureReason::CommunicationFailure))
                    .await
            }
        }
    }

    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Result<()> {
        let Envelope {
            origin,
            message,
            reply,
        } = envelope;
        match message {
            Message::AutomationResult { success, error } => {
                acknowledge(reply);
                let state = self.store.snapshot().await?;
                if state.current_task.is_none() {
                    debug!("Result arrived with no task in flight");
                    return Ok(());
                }
                if origin.is_some() && origin != state.active_page {
                    debug!(?origin, "Result from a stale page ignored");
                    return Ok(());
                }
                let outcome = match (success, error) {
                    (true, _) => Outcome::success(),
                    (false, Some(reason)) => Outcome::failed(reason),
                    (false, None) => {
                        Outcome::failed(FailureReason::PageError("no reason given".into()))
                    }
                };
                self.complete(outcome).await
            }
            Message::Log { message, severity } => {
                self.activity(message, severity).await;
                Ok(())
            }
            Message::CheckNow => {
                self.activity("🔔 Manual check triggered from dashboard", Severity::Action)
                    .await;
                acknowledge(reply);
                self.check().await
            }
            Message::ClearLogs => {
                let cleared = self.store.clear_logs().await;
                acknowledge(reply);
                cleared
            }
            Message::RunAutomation { task } => {
                debug!(task = %task.key(), "Controller does not run automations itself");
                Ok(())
            }
        }
    }

    /// Hand the in-flight task to a fresh page context, retrying once.
    async fn dispatch(&mut self) -> Result<()> {
        let state = self.store.snapshot().await?;
        let (Some(task), Some(page)) = (state.current_task, state.active_page) else {
            return Ok(());
        };

        match self.deliver(&page, &task).await {
            Ok(context) => {
                self.context = Some(context);
                return Ok(());
            }
            Err(e) => {
                self.activity(format!("Failed to communicate with page: {e}"), Severity::Error)
                    .await;
            }
        }

        tokio::time::sleep(self.queue.send_retry_delay).await;
        match self.deliver(&page, &task).await {
            Ok(context) => {
                self.context = Some(context);
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Dispatch retry failed");
                self.activity(
                    "Page context not responding, marking task failed",
                    Severity::Error,
                )
                .await;
                self.complete(Outcome::failed(FailureReason::CommunicationFailure))
                    .await
            }
        }
    }

    async fn deliver(&self, page: &PageHandle, task: &Task) -> Result<PageContextHandle> {
        let driver = self.host.attach(page).await?;
        let context = PageContext::spawn(
            page.clone(),
            driver,
            self.automation.clone(),
            self.profile.clone(),
            self.inbox_tx.clone(),
        );
        let ack = context
            .run_automation(task.clone(), self.queue.dispatch_ack_timeout)
            .await?;
        if !ack.received {
            self.activity("Content script busy or not ready", Severity::Info)
                .await;
        }
        Ok(context)
    }

    /// Record the in-flight task's outcome, close its page and pace the
    /// next task.
    async fn complete(&mut self, outcome: Outcome) -> Result<()> {
        let status = outcome.report_status();
        let finished = self
            .store
            .update(move |s| {
                let page = s.active_page.clone();
                let task = s.finish_current()?;
                s.campaign_stats
                    .entry(task.campaign_id.clone())
                    .or_default()
                    .apply_status(status);
                Some((task, page))
            })
            .await?;
        let Some((task, page)) = finished else {
            return Ok(());
        };
        self.dispatch_at = None;

        let label = task.label();
        match &outcome.error {
            None => {
                self.activity(format!("✅ Connection sent to {label}!"), Severity::Success)
                    .await
            }
            Some(reason) if reason.is_quiet() => {
                info!(task = %task.key(), %reason, "Task skipped");
                self.activity(format!("⏭️ Skipped {label}: {reason}"), Severity::Info)
                    .await
            }
            Some(reason) => {
                self.activity(format!("❌ Failed for {label}: {reason}"), Severity::Error)
                    .await
            }
        }

        let report = StatusReport::for_outcome(&task, &outcome);
        if let Err(e) = self.plane.report_status(&report).await {
            self.activity(format!("Failed to update status in API: {e}"), Severity::Error)
                .await;
        }

        if let Some(context) = self.context.take() {
            context.shutdown();
        }
        if let Some(page) = page {
            if self.host.has_page(&page).await {
                if let Err(e) = self.host.close_page(&page).await {
                    warn!(%page, error = %e, "Failed to close page");
                }
            }
        }

        let remaining = self.store.snapshot().await?.pending_tasks.len();
        if remaining > 0 {
            let delay = pacing_delay(&self.queue);
            self.advance_at = Some(Instant::now() + delay);
            info!(?delay, remaining, "Next task paced");
            let minutes = (delay.as_secs() + 30) / 60;
            self.activity(
                format!("⏰ Waiting {minutes} min before next task ({remaining} remaining)..."),
                Severity::Info,
            )
            .await;
        } else {
            self.activity("🎉 All tasks in queue completed!", Severity::Success)
                .await;
        }
        Ok(())
    }
}
