//! Per-task state machine.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::LogSink;
use super::dialog::{DialogDriver, DialogEntry};
use crate::config::AutomationSettings;
use crate::heuristics::{self, SiteProfile};
use crate::page::PageDriver;
use crate::store::Severity;
use crate::tasks::{FailureReason, Outcome, Task};

/// Run state. Transitions are strictly forward; `AddingNote` is skipped
/// when the dialog offers no note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Analyzing,
    LocatingAction,
    ActionActivated,
    AwaitingDialog,
    DialogOpen,
    AddingNote,
    TypingNote,
    Submitting,
    VerifyingOutcome,
    Success,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn permits(self, next: RunState) -> bool {
        use RunState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Analyzing)
                | (Analyzing, LocatingAction)
                | (LocatingAction, ActionActivated)
                | (ActionActivated, AwaitingDialog)
                | (AwaitingDialog, DialogOpen)
                | (DialogOpen, AddingNote)
                | (DialogOpen, Submitting)
                | (AddingNote, TypingNote)
                | (TypingNote, Submitting)
                | (Submitting, VerifyingOutcome)
                | (VerifyingOutcome, Success)
        )
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub subject: Option<String>,
    pub history: Vec<RunState>,
}

/// One automation run against one page.
pub struct AutomationRun {
    page: Arc<dyn PageDriver>,
    settings: AutomationSettings,
    profile: SiteProfile,
    sink: LogSink,
    state: RunState,
    history: Vec<RunState>,
    subject: Option<String>,
}

impl AutomationRun {
    pub fn new(
        page: Arc<dyn PageDriver>,
        settings: AutomationSettings,
        profile: SiteProfile,
        sink: LogSink,
    ) -> Self {
        Self {
            page,
            settings,
            profile,
            sink,
            state: RunState::Idle,
            history: vec![RunState::Idle],
            subject: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, next: RunState) {
        if !self.state.permits(next) {
            warn!(from = ?self.state, to = ?next, "Unexpected run transition");
        }
        debug!(from = ?self.state, to = ?next, "Run transition");
        self.state = next;
        self.history.push(next);
    }

    /// Drive the run to a terminal state. Visual affordances are removed on
    /// every path.
    pub async fn execute(mut self, task: &Task) -> RunReport {
        info!(task = %task.key(), "Automation run started");
        let result = self.drive(task).await;

        let page = self.page.clone();
        let driver = DialogDriver::new(page.as_ref(), &self.settings, &self.profile, &self.sink);
        match &result {
            Ok(()) => {
                driver
                    .note("Request sent successfully", Severity::Success)
                    .await
            }
            Err(reason) => driver.note(&reason.to_string(), Severity::Error).await,
        }
        driver.pause(self.settings.teardown_linger).await;
        if let Err(e) = page.teardown().await {
            warn!(error = %e, "Teardown failed");
        }

        self.enter(if result.is_ok() {
            RunState::Success
        } else {
            RunState::Failed
        });
        let outcome = Outcome::from(result);
        info!(task = %task.key(), success = outcome.success, "Automation run finished");
        RunReport {
            outcome,
            subject: self.subject,
            history: self.history,
        }
    }

    async fn drive(&mut self, task: &Task) -> Result<(), FailureReason> {
        let page = self.page.clone();
        let settings = self.settings.clone();
        let profile = self.profile.clone();
        let sink = self.sink.clone();
        let driver = DialogDriver::new(page.as_ref(), &settings, &profile, &sink);

        self.enter(RunState::Analyzing);
        driver.note("Analyzing profile...", Severity::Info).await;
        driver.pause(settings.analysis_settle).await;
        let snapshot = driver.snapshot().await?;
        let subject = heuristics::canonical_subject(&snapshot, &profile)
            .ok_or(FailureReason::ProfileIdentificationFailure)?;
        driver
            .note(&format!("Main profile: \"{subject}\""), Severity::Info)
            .await;
        self.subject = Some(subject.clone());
        driver.scroll_to_top().await?;

        self.enter(RunState::LocatingAction);
        let action = driver.locate_action(&subject).await?;

        driver.note("Activating the action control...", Severity::Action).await;
        driver.click(&action, settings.highlight_delay).await?;
        self.enter(RunState::ActionActivated);
        driver.pause(settings.activation_settle).await;

        self.enter(RunState::AwaitingDialog);
        driver.note("Waiting for dialog...", Severity::Info).await;
        driver.wait_for_dialog().await?;

        self.enter(RunState::DialogOpen);
        driver.note("Dialog opened", Severity::Success).await;
        driver.pause(settings.dialog_settle).await;

        match driver.dialog_entry().await? {
            DialogEntry::SendDirect(send) => {
                self.enter(RunState::Submitting);
                driver.note("Sending without a note...", Severity::Action).await;
                driver.click(&send, settings.submit_delay).await?;
            }
            DialogEntry::AddNote(add_note) => {
                self.enter(RunState::AddingNote);
                driver.note("Opening the note field...", Severity::Action).await;
                driver.click(&add_note, settings.submit_delay).await?;
                driver.pause(settings.note_settle).await;
                let field = driver.wait_for_text_surface().await?;

                self.enter(RunState::TypingNote);
                driver.note("Typing message...", Severity::Info).await;
                page.highlight(&field, true)
                    .await
                    .map_err(|e| FailureReason::PageError(e.to_string()))?;
                let typed = driver.type_text(&field, &task.personalized_text).await;
                page.highlight(&field, false)
                    .await
                    .map_err(|e| FailureReason::PageError(e.to_string()))?;
                typed?;
                driver
                    .note(
                        &format!("Typed {} chars", task.personalized_text.chars().count()),
                        Severity::Success,
                    )
                    .await;

                driver.pause(settings.submit_delay).await;
                let send = driver.find_submit().await?;
                self.enter(RunState::Submitting);
                driver.note("Sending...", Severity::Action).await;
                driver.click(&send, settings.submit_delay).await?;
            }
        }

        self.enter(RunState::VerifyingOutcome);
        driver.verify().await
    }
}
