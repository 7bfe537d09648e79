//! Per-page context: the actor that owns one page driver and runs at most
//! one automation at a time inside it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{Envelope, Message, Reply, RunAck};
use crate::automation::{AutomationRun, LogSink};
use crate::config::AutomationSettings;
use crate::error::{Error, Result};
use crate::heuristics::SiteProfile;
use crate::page::{PageDriver, PageHandle};
use crate::tasks::{FailureReason, Outcome, Task};

const INBOX_CAPACITY: usize = 16;

/// Controller-side handle to a running page context.
pub struct PageContextHandle {
    page: PageHandle,
    inbox: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PageContextHandle {
    pub fn page(&self) -> &PageHandle {
        &self.page
    }

    /// Deliver `RUN_AUTOMATION` and wait up to `timeout` for the ack.
    ///
    /// An error means the context never answered: its inbox is gone, the
    /// reply was dropped, or the wait timed out.
    pub async fn run_automation(&self, task: Task, timeout: Duration) -> Result<RunAck> {
        let (envelope, reply) = Envelope::request(Message::RunAutomation { task });
        self.inbox
            .send(envelope)
            .await
            .map_err(|_| Error::ChannelClosed("page context inbox"))?;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(Reply::Run(ack))) => Ok(ack),
            Ok(Ok(other)) => Err(Error::Page(format!("unexpected reply {other:?}"))),
            Ok(Err(_)) => Err(Error::ChannelClosed("run ack")),
            Err(_) => Err(Error::Timeout("run ack")),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the context. A run still in progress reports a failed result.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PageContextHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct PageContext {
    page: PageHandle,
    driver: Arc<dyn PageDriver>,
    settings: AutomationSettings,
    profile: SiteProfile,
    controller: mpsc::Sender<Envelope>,
    busy: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl PageContext {
    /// Spawn a context for `page`; results and log lines go to `controller`.
    pub fn spawn(
        page: PageHandle,
        driver: Arc<dyn PageDriver>,
        settings: AutomationSettings,
        profile: SiteProfile,
        controller: mpsc::Sender<Envelope>,
    ) -> PageContextHandle {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let cancel = CancellationToken::new();
        let context = Self {
            page: page.clone(),
            driver,
            settings,
            profile,
            controller,
            busy: Arc::new(AtomicBool::new(false)),
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(context.run(rx));
        PageContextHandle {
            page,
            inbox: tx,
            cancel,
            join,
        }
    }

    async fn run(self, mut inbox: mpsc::Receiver<Envelope>) {
        debug!(page = %self.page, "Page context ready");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = inbox.recv() => {
                    let Some(envelope) = received else { break };
                    self.handle(envelope);
                }
            }
        }
        debug!(page = %self.page, "Page context stopped");
    }

    fn handle(&self, envelope: Envelope) {
        let Envelope { message, reply, .. } = envelope;
        let respond = |answer: Reply| {
            if let Some(tx) = reply {
                let _ = tx.send(answer);
            }
        };
        match message {
            Message::RunAutomation { task } => {
                if self.busy.swap(true, Ordering::SeqCst) {
                    info!(page = %self.page, "Run requested while busy");
                    respond(Reply::Run(RunAck::busy()));
                    return;
                }
                respond(Reply::Run(RunAck::accepted()));
                self.start_run(task);
            }
            other => {
                debug!(page = %self.page, kind = other.kind(), "Ignoring message in page context");
                respond(Reply::ok());
            }
        }
    }

    fn start_run(&self, task: Task) {
        let page = self.page.clone();
        let driver = self.driver.clone();
        let controller = self.controller.clone();
        let busy = self.busy.clone();
        let cancel = self.cancel.clone();
        let run = AutomationRun::new(
            driver.clone(),
            self.settings.clone(),
            self.profile.clone(),
            self.log_sink(),
        );

        tokio::spawn(async move {
            let outcome = tokio::select! {
                report = run.execute(&task) => report.outcome,
                _ = cancel.cancelled() => {
                    warn!(page = %page, task = %task.key(), "Run abandoned with its page");
                    if let Err(e) = driver.teardown().await {
                        debug!(error = %e, "Teardown after cancellation failed");
                    }
                    Outcome::failed(FailureReason::PageError("page context closed".into()))
                }
            };
            busy.store(false, Ordering::SeqCst);
            let result = Envelope::from_page(page, Message::result(outcome));
            if controller.send(result).await.is_err() {
                warn!(task = %task.key(), "Controller gone before the result was delivered");
            }
        });
    }

    /// Log lines are forwarded without waiting; a full inbox drops them.
    fn log_sink(&self) -> LogSink {
        let page = self.page.clone();
        let controller = self.controller.clone();
        Arc::new(move |message, severity| {
            let envelope = Envelope::from_page(page.clone(), Message::log(message, severity));
            if controller.try_send(envelope).is_err() {
                debug!(%message, "Dropped page log line");
            }
        })
    }
}
