//! Dialog/form driver: the individual page steps of one run.
//!
//! Every lookup re-reads the page, so each step sees the page as it is now
//! rather than as it was when the run started.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

use super::LogSink;
use crate::config::AutomationSettings;
use crate::heuristics::{self, Located, SiteProfile};
use crate::page::{ElementRef, PageDriver, PageSnapshot};
use crate::retry::{PollOutcome, PollPolicy, poll_until};
use crate::store::Severity;
use crate::tasks::FailureReason;

/// What the dialog offers once it is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEntry {
    /// An "add a note" affordance.
    AddNote(ElementRef),
    /// No note affordance; a direct send control.
    SendDirect(ElementRef),
}

pub struct DialogDriver<'a> {
    page: &'a dyn PageDriver,
    settings: &'a AutomationSettings,
    profile: &'a SiteProfile,
    sink: &'a LogSink,
}

impl<'a> DialogDriver<'a> {
    pub fn new(
        page: &'a dyn PageDriver,
        settings: &'a AutomationSettings,
        profile: &'a SiteProfile,
        sink: &'a LogSink,
    ) -> Self {
        Self {
            page,
            settings,
            profile,
            sink,
        }
    }

    /// Report progress to the activity log and the on-page indicator.
    pub async fn note(&self, message: &str, severity: Severity) {
        (self.sink)(message, severity);
        if let Err(e) = self.page.show_status(message, severity).await {
            debug!(error = %e, "Status indicator update failed");
        }
    }

    pub async fn snapshot(&self) -> Result<PageSnapshot, FailureReason> {
        self.page
            .snapshot()
            .await
            .map_err(|e| FailureReason::PageError(e.to_string()))
    }

    pub async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn scroll_to_top(&self) -> Result<(), FailureReason> {
        self.page.scroll_to_top().await.map_err(page_error)?;
        self.pause(self.settings.scroll_settle).await;
        Ok(())
    }

    /// Find the subject's primary action control, polling the page.
    ///
    /// When every attempt comes up empty the page is inspected once more to
    /// tell "already pending" and "already linked" from a plain miss.
    pub async fn locate_action(&self, subject: &str) -> Result<ElementRef, FailureReason> {
        let first = heuristics::first_name(subject, self.profile);
        self.note(
            &format!("Looking for the action control for \"{subject}\" (first name: {first})"),
            Severity::Info,
        )
        .await;

        let policy = PollPolicy::new(self.settings.locate_attempts, self.settings.locate_interval);
        let outcome = poll_until(&policy, move |attempt| self.locate_once(subject, attempt)).await?;

        match outcome {
            PollOutcome::Found(target) => Ok(target),
            PollOutcome::Exhausted { .. } => {
                let page = self.snapshot().await?;
                Err(heuristics::diagnose_missing_action(&page, self.profile))
            }
        }
    }

    async fn locate_once(
        &self,
        subject: &str,
        attempt: u32,
    ) -> Result<Option<ElementRef>, FailureReason> {
        let page = self.snapshot().await?;

        let by_label = heuristics::find_labelled_action(&page, subject, self.profile);
        if let Some(found) = self.accept(&page, by_label, "accessible label").await {
            return Ok(Some(found));
        }

        let by_text = heuristics::find_text_action(&page, subject, self.profile);
        if let Some(found) = self.accept(&page, by_text, "visible text").await {
            return Ok(Some(found));
        }

        if let Some(found) = self.locate_in_overflow_menu(&page, subject).await? {
            return Ok(Some(found));
        }

        self.note(
            &format!(
                "Attempt {attempt}/{} - action control not found, waiting...",
                self.settings.locate_attempts
            ),
            Severity::Info,
        )
        .await;
        Ok(None)
    }

    async fn accept(&self, page: &PageSnapshot, located: Located, how: &str) -> Option<ElementRef> {
        for (id, rejection) in &located.rejected {
            let node = page.node(*id);
            let name = node.aria_label.clone().unwrap_or_else(|| page.text_content(*id));
            debug!(control = %name, %rejection, "Skipped candidate control");
            (self.sink)(&format!("Skipping \"{name}\": {rejection}"), Severity::Info);
        }
        let id = located.control?;
        self.note(&format!("Found action control by {how}"), Severity::Success)
            .await;
        Some(page.node(id).element_ref.clone())
    }

    async fn locate_in_overflow_menu(
        &self,
        page: &PageSnapshot,
        subject: &str,
    ) -> Result<Option<ElementRef>, FailureReason> {
        let overflow = heuristics::find_overflow_control(page, subject, self.profile);
        let Some(more) = overflow.control else {
            return Ok(None);
        };
        let more = page.node(more).element_ref.clone();

        self.note("Opening the overflow menu...", Severity::Info).await;
        self.page.activate(&more).await.map_err(page_error)?;
        self.pause(self.settings.menu_settle).await;

        let opened = self.snapshot().await?;
        let in_menu = heuristics::find_menu_action(&opened, subject, self.profile);
        if let Some(found) = self.accept(&opened, in_menu, "overflow menu").await {
            return Ok(Some(found));
        }

        self.note("Action not in the overflow menu, closing it", Severity::Info)
            .await;
        self.page.dismiss_menus().await.map_err(page_error)?;
        self.pause(self.settings.menu_close).await;
        Ok(None)
    }

    /// Highlight, pause, activate, un-highlight.
    pub async fn click(&self, target: &ElementRef, delay: Duration) -> Result<(), FailureReason> {
        self.page.highlight(target, true).await.map_err(page_error)?;
        self.pause(delay).await;
        let result = self.page.activate(target).await.map_err(page_error);
        self.page.highlight(target, false).await.map_err(page_error)?;
        result
    }

    /// Poll for the action dialog, shadow trees included.
    pub async fn wait_for_dialog(&self) -> Result<(), FailureReason> {
        let policy = PollPolicy::within(self.settings.dialog_timeout, self.settings.dialog_poll);
        let outcome = poll_until(&policy, move |_| async move {
            let page = self.snapshot().await?;
            Ok::<_, FailureReason>(heuristics::find_dialog(&page, self.profile).map(|_| ()))
        })
        .await?;

        if let PollOutcome::Exhausted { .. } = outcome {
            let page = self.snapshot().await?;
            let dialogs = page.find_all_deep(|n| n.has_role("dialog")).len();
            self.note(
                &format!("Dialog not found. Found {dialogs} dialogs on page."),
                Severity::Error,
            )
            .await;
            return Err(FailureReason::DialogTimeout);
        }
        Ok(())
    }

    /// Choose between the note affordance and a direct send control.
    pub async fn dialog_entry(&self) -> Result<DialogEntry, FailureReason> {
        let page = self.snapshot().await?;
        let dialog =
            heuristics::find_dialog(&page, self.profile).ok_or(FailureReason::DialogTimeout)?;

        if let Some(id) =
            heuristics::find_button_in(&page, dialog, &self.profile.add_note_labels, false)
        {
            return Ok(DialogEntry::AddNote(page.node(id).element_ref.clone()));
        }

        self.note("No note affordance, looking for a direct send", Severity::Info)
            .await;
        let labels = &self.profile.send_without_note_labels;
        heuristics::find_button_in(&page, dialog, labels, false)
            .or_else(|| heuristics::find_button_in(&page, dialog, labels, true))
            .map(|id| DialogEntry::SendDirect(page.node(id).element_ref.clone()))
            .ok_or(FailureReason::SubmitControlNotFound)
    }

    /// Poll for the note field.
    pub async fn wait_for_text_surface(&self) -> Result<ElementRef, FailureReason> {
        let policy = PollPolicy::new(
            self.settings.text_surface_attempts,
            self.settings.text_surface_interval,
        );
        let outcome = poll_until(&policy, move |_| async move {
            let page = self.snapshot().await?;
            let dialog = heuristics::find_dialog(&page, self.profile);
            Ok::<_, FailureReason>(
                heuristics::find_text_surface(&page, dialog)
                    .map(|id| page.node(id).element_ref.clone()),
            )
        })
        .await?;
        outcome.found().ok_or(FailureReason::InputSurfaceNotFound)
    }

    /// Clear the field, then append `text` one character at a time with a
    /// randomized pause after each.
    pub async fn type_text(&self, target: &ElementRef, text: &str) -> Result<(), FailureReason> {
        self.page.clear_field(target).await.map_err(page_error)?;
        for ch in text.chars() {
            self.page.append_char(target, ch).await.map_err(page_error)?;
            self.pause(typing_delay(self.settings)).await;
        }
        self.page.commit_field(target).await.map_err(page_error)
    }

    /// Send control after a note: exact label first, then the primary
    /// styled button, then a partial label.
    pub async fn find_submit(&self) -> Result<ElementRef, FailureReason> {
        let page = self.snapshot().await?;
        let dialog =
            heuristics::find_dialog(&page, self.profile).ok_or(FailureReason::SubmitControlNotFound)?;
        let labels = &self.profile.send_labels;
        heuristics::find_button_in(&page, dialog, labels, false)
            .or_else(|| heuristics::find_primary_submit(&page, dialog, self.profile))
            .or_else(|| heuristics::find_button_in(&page, dialog, labels, true))
            .map(|id| page.node(id).element_ref.clone())
            .ok_or(FailureReason::SubmitControlNotFound)
    }

    /// After the settle delay, an open dialog showing an error is a rejection.
    pub async fn verify(&self) -> Result<(), FailureReason> {
        self.pause(self.settings.verify_settle).await;
        let page = self.snapshot().await?;
        if heuristics::dialog_shows_error(&page, self.profile) {
            return Err(FailureReason::RemoteRejection);
        }
        Ok(())
    }
}

fn page_error(e: crate::error::Error) -> FailureReason {
    FailureReason::PageError(e.to_string())
}

/// One inter-character pause, uniform within the configured bounds.
pub fn typing_delay(settings: &AutomationSettings) -> Duration {
    let low = settings.typing_min.as_millis() as u64;
    let high = (settings.typing_max.as_millis() as u64).max(low);
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_delay_stays_in_bounds() {
        let settings = AutomationSettings::default();
        for _ in 0..200 {
            let d = typing_delay(&settings);
            assert!(d >= Duration::from_millis(30) && d <= Duration::from_millis(70));
        }
    }
}
