//! The in-page automation run: dialog driver plus the state machine that
//! sequences it.

mod dialog;
mod state_machine;

pub use dialog::{DialogDriver, DialogEntry, typing_delay};
pub use state_machine::{AutomationRun, RunReport, RunState};

use std::sync::Arc;

use crate::store::Severity;

/// Receiver of progress lines emitted during a run.
pub type LogSink = Arc<dyn Fn(&str, Severity) + Send + Sync>;

/// A sink that drops everything.
pub fn discard_logs() -> LogSink {
    Arc::new(|_, _| {})
}
