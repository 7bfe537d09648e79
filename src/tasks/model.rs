//! Task model: what the control plane hands out and what runs report back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One personalized outreach action against one target page.
///
/// Wire names follow the control plane's API; the descriptive names are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "campaignId")]
    pub campaign_id: String,
    #[serde(rename = "campaignSheetId", alias = "campaignContainerId")]
    pub campaign_container_id: String,
    #[serde(rename = "profileUrl", alias = "targetUrl")]
    pub target_url: String,
    #[serde(rename = "personalizedNote", alias = "personalizedText", default)]
    pub personalized_text: String,
    #[serde(rename = "templateUsed", alias = "templateIndex", default)]
    pub template_index: u32,
}

/// Identity of a task: `(campaignId, targetUrl)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub campaign_id: String,
    pub target_url: String,
}

impl Task {
    pub fn key(&self) -> TaskKey {
        TaskKey {
            campaign_id: self.campaign_id.clone(),
            target_url: self.target_url.clone(),
        }
    }

    pub fn same_identity(&self, other: &Task) -> bool {
        self.campaign_id == other.campaign_id && self.target_url == other.target_url
    }

    /// Short label for log lines (the profile slug when there is one).
    pub fn label(&self) -> String {
        task_label(&self.target_url)
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.campaign_id, task_label(&self.target_url))
    }
}

/// Extract the profile slug from a target URL, falling back to the URL itself.
pub fn task_label(url: &str) -> String {
    url.split("/in/")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| url.to_string())
}

/// Whether `url` looks like a profile page the engine knows how to drive.
pub fn is_profile_url(url: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    PATTERN
        .get_or_init(|| {
            regex::Regex::new(r"^https?://(www\.)?linkedin\.com/(in|company)/[a-zA-Z0-9-]+/?$")
                .expect("static regex")
        })
        .is_match(url)
}

/// Why a run ended in `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail")]
pub enum FailureReason {
    #[error("Could not identify profile owner from page")]
    ProfileIdentificationFailure,
    #[error("Action control not found for main profile")]
    ActionControlNotFound,
    #[error("Connection already pending")]
    AlreadyInProgress,
    #[error("Already connected (no action control available)")]
    AlreadyLinked,
    #[error("Dialog did not appear")]
    DialogTimeout,
    #[error("Note input not found after opening the note affordance")]
    InputSurfaceNotFound,
    #[error("Send control not found")]
    SubmitControlNotFound,
    #[error("Site showed an error after submitting")]
    RemoteRejection,
    #[error("Page context not responding")]
    CommunicationFailure,
    #[error("Page error: {0}")]
    PageError(String),
}

impl FailureReason {
    /// Terminal skips that are expected in normal operation.
    pub fn is_quiet(&self) -> bool {
        matches!(self, Self::AlreadyInProgress | Self::AlreadyLinked)
    }
}

/// Terminal classification of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReason>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self {
            success: false,
            error: Some(reason),
        }
    }

    pub fn report_status(&self) -> ReportStatus {
        if self.success {
            ReportStatus::Sent
        } else {
            ReportStatus::Failed
        }
    }
}

impl From<Result<(), FailureReason>> for Outcome {
    fn from(result: Result<(), FailureReason>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(reason) => Self::failed(reason),
        }
    }
}

/// Per-task status sent to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Sent,
    Failed,
}

/// Out-of-band response status for a previously sent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Accepted,
    Rejected,
}

/// Body of the per-task status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub campaign_id: String,
    pub campaign_sheet_id: String,
    pub profile_url: String,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusReport {
    pub fn for_outcome(task: &Task, outcome: &Outcome) -> Self {
        Self {
            campaign_id: task.campaign_id.clone(),
            campaign_sheet_id: task.campaign_container_id.clone(),
            profile_url: task.target_url.clone(),
            status: outcome.report_status(),
            error_message: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Body of the out-of-band response-status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReport {
    pub campaign_id: String,
    pub campaign_sheet_id: String,
    pub profile_url: String,
    pub response_status: ResponseStatus,
}

/// Aggregate counters for one campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub pending: u32,
    pub sent: u32,
    pub failed: u32,
    pub accepted: u32,
    pub rejected: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl CampaignStats {
    pub fn apply_status(&mut self, status: ReportStatus) {
        match status {
            ReportStatus::Sent => self.sent += 1,
            ReportStatus::Failed => self.failed += 1,
        }
        self.pending = self.pending.saturating_sub(1);
        self.last_run = Some(Utc::now());
    }

    pub fn apply_response(&mut self, status: ResponseStatus) {
        match status {
            ResponseStatus::Accepted => self.accepted += 1,
            ResponseStatus::Rejected => self.rejected += 1,
        }
    }

    /// Accepted share of sent, in percent with one decimal.
    pub fn acceptance_rate(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        (f64::from(self.accepted) / f64::from(self.sent) * 1000.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Task {
        Task {
            campaign_id: "c1".into(),
            campaign_container_id: "sheet-1".into(),
            target_url: "https://www.linkedin.com/in/jane-doe/".into(),
            personalized_text: "Hi Jane".into(),
            template_index: 2,
        }
    }

    #[test]
    fn task_reads_control_plane_names() {
        let task: Task = serde_json::from_value(json!({
            "campaignId": "c1",
            "campaignSheetId": "sheet-1",
            "profileUrl": "https://www.linkedin.com/in/jane-doe/",
            "personalizedNote": "Hi Jane",
            "templateUsed": 2
        }))
        .unwrap();
        assert_eq!(task, sample());
    }

    #[test]
    fn task_accepts_descriptive_aliases() {
        let task: Task = serde_json::from_value(json!({
            "campaignId": "c1",
            "campaignContainerId": "sheet-1",
            "targetUrl": "https://www.linkedin.com/in/jane-doe/",
            "personalizedText": "Hi Jane",
            "templateIndex": 2
        }))
        .unwrap();
        assert_eq!(task, sample());
    }

    #[test]
    fn label_uses_profile_slug() {
        assert_eq!(sample().label(), "jane-doe");
        assert_eq!(task_label("https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn profile_url_validation() {
        assert!(is_profile_url("https://www.linkedin.com/in/jane-doe/"));
        assert!(is_profile_url("http://linkedin.com/company/acme"));
        assert!(!is_profile_url("https://www.linkedin.com/feed/"));
        assert!(!is_profile_url("https://example.com/in/jane"));
    }

    #[test]
    fn status_report_carries_reason_text() {
        let report =
            StatusReport::for_outcome(&sample(), &Outcome::failed(FailureReason::DialogTimeout));
        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["status"], "failed");
        assert_eq!(body["campaignSheetId"], "sheet-1");
        assert_eq!(body["errorMessage"], "Dialog did not appear");

        let sent = serde_json::to_value(StatusReport::for_outcome(&sample(), &Outcome::success()))
            .unwrap();
        assert_eq!(sent["status"], "sent");
        assert!(sent.get("errorMessage").is_none());
    }

    #[test]
    fn counters_follow_reports() {
        let mut stats = CampaignStats {
            pending: 1,
            ..Default::default()
        };
        stats.apply_status(ReportStatus::Sent);
        stats.apply_status(ReportStatus::Failed);
        assert_eq!((stats.pending, stats.sent, stats.failed), (0, 1, 1));

        stats.apply_response(ResponseStatus::Accepted);
        stats.sent = 3;
        assert_eq!(stats.acceptance_rate(), 33.3);
        assert_eq!(CampaignStats::default().acceptance_rate(), 0.0);
    }
}
