//! Task display: severity icons and terminal formatting.

use colored::Colorize;

use super::model::{CampaignStats, Task};
use crate::store::{LogEntry, Severity};

/// Disable colour when asked to, or when `NO_COLOR` is set.
pub fn init_color(no_color: bool) {
    let env_disabled = std::env::var("NO_COLOR").is_ok_and(|v| !v.is_empty());
    if no_color || env_disabled {
        colored::control::set_override(false);
    }
}

/// Emoji shown before an activity entry.
pub fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "ℹ️",
        Severity::Success => "✅",
        Severity::Error => "❌",
        Severity::Action => "🔄",
    }
}

/// One activity entry as a terminal line, coloured by severity.
pub fn format_log_line(entry: &LogEntry) -> String {
    let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
    let message = match entry.severity {
        Severity::Info => entry.message.normal(),
        Severity::Success => entry.message.green(),
        Severity::Error => entry.message.red(),
        Severity::Action => entry.message.cyan(),
    };
    format!(
        "{} {} {}",
        time.dimmed(),
        severity_icon(entry.severity),
        message
    )
}

/// Multi-line queue summary for `status`.
pub fn format_queue_summary<'a>(
    current: Option<&Task>,
    pending: usize,
    stats: impl IntoIterator<Item = (&'a String, &'a CampaignStats)>,
) -> String {
    let mut out = String::new();
    match current {
        Some(task) => out.push_str(&format!("In flight: {}\n", task.label().bold())),
        None => out.push_str("In flight: idle\n"),
    }
    out.push_str(&format!("Pending:   {}\n", pending));

    let mut any = false;
    for (campaign, s) in stats {
        if !any {
            out.push_str("\nCampaigns:\n");
            any = true;
        }
        out.push_str(&format!(
            "  {:<20} pending {:>3}  sent {:>3}  failed {:>3}  accepted {:>3}  rejected {:>3}  ({:.1}%)\n",
            campaign,
            s.pending,
            s.sent,
            s.failed,
            s.accepted,
            s.rejected,
            s.acceptance_rate()
        ));
    }
    out
}
