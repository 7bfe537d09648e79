//! Task types and their terminal outcomes.
//!
//! Tasks come from the control plane, are consumed exactly once by the
//! automation run, and are never mutated in place.

mod display;
mod model;

pub use display::{format_log_line, format_queue_summary, init_color, severity_icon};
pub use model::{
    CampaignStats, FailureReason, Outcome, ReportStatus, ResponseReport, ResponseStatus,
    StatusReport, Task, TaskKey, is_profile_url, task_label,
};
