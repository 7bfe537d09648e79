//! The process-wide queue record and its invariants.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::{Error, Result};
use crate::page::PageHandle;
use crate::tasks::{CampaignStats, Task};

/// Durable queue state, read and written as one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueState {
    /// Bumped on every committed update.
    pub version: u64,
    /// FIFO, in control-plane response order.
    pub pending_tasks: VecDeque<Task>,
    /// Presence is the single-flight lock.
    pub current_task: Option<Task>,
    /// Page under automation; present iff `current_task` is.
    pub active_page: Option<PageHandle>,
    /// Page the run was already dispatched to.
    pub dispatch_guard: Option<PageHandle>,
    /// Aggregate counters keyed by campaign id.
    pub campaign_stats: BTreeMap<String, CampaignStats>,
}

impl QueueState {
    pub fn is_busy(&self) -> bool {
        self.current_task.is_some()
    }

    /// Check the record's structural invariants.
    pub fn check_invariants(&self) -> Result<()> {
        if self.current_task.is_some() != self.active_page.is_some() {
            return Err(Error::Invariant(format!(
                "current task present = {}, active page present = {}",
                self.current_task.is_some(),
                self.active_page.is_some()
            )));
        }
        if let Some(current) = &self.current_task {
            if self.pending_tasks.iter().any(|t| t.same_identity(current)) {
                return Err(Error::Invariant(format!(
                    "pending queue still holds the current task {}",
                    current.key()
                )));
            }
        }
        if let Some(guard) = &self.dispatch_guard {
            if self.active_page.as_ref() != Some(guard) {
                return Err(Error::Invariant(format!(
                    "dispatch guard {} does not match the active page",
                    guard
                )));
            }
        }
        Ok(())
    }

    /// Move the head of the queue into `current_task` on `page`.
    ///
    /// Returns `None` (and changes nothing) when a task is already in flight
    /// or the queue is empty.
    pub fn begin_next(&mut self, page: PageHandle) -> Option<Task> {
        if self.is_busy() {
            return None;
        }
        let task = self.pending_tasks.pop_front()?;
        self.current_task = Some(task.clone());
        self.active_page = Some(page);
        self.dispatch_guard = None;
        Some(task)
    }

    /// Release the single-flight lock, returning the task that held it.
    pub fn finish_current(&mut self) -> Option<Task> {
        self.active_page = None;
        self.dispatch_guard = None;
        self.current_task.take()
    }

    /// Replace the queue with a fresh control-plane listing.
    ///
    /// Entries matching the in-flight task are dropped. Campaign `pending`
    /// counters are reseeded from the new listing. Returns how many tasks
    /// were queued.
    pub fn replace_pending(&mut self, tasks: Vec<Task>) -> usize {
        let current = self.current_task.clone();
        let fresh: VecDeque<Task> = tasks
            .into_iter()
            .filter(|t| current.as_ref().is_none_or(|c| !c.same_identity(t)))
            .collect();

        for stats in self.campaign_stats.values_mut() {
            stats.pending = 0;
        }
        for task in &fresh {
            self.campaign_stats
                .entry(task.campaign_id.clone())
                .or_default()
                .pending += 1;
        }

        self.pending_tasks = fresh;
        self.pending_tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, slug: &str) -> Task {
        Task {
            campaign_id: id.into(),
            campaign_container_id: format!("sheet-{id}"),
            target_url: format!("https://www.linkedin.com/in/{slug}/"),
            personalized_text: String::new(),
            template_index: 1,
        }
    }

    #[test]
    fn begin_next_is_single_flight() {
        let mut state = QueueState::default();
        state.replace_pending(vec![task("c", "a"), task("c", "b")]);

        let first = state.begin_next(PageHandle::new("p1")).unwrap();
        assert_eq!(first.label(), "a");
        assert!(state.begin_next(PageHandle::new("p2")).is_none());
        assert_eq!(state.pending_tasks.len(), 1);
        assert_eq!(state.active_page, Some(PageHandle::new("p1")));
        state.check_invariants().unwrap();
    }

    #[test]
    fn finish_restores_idle_invariant() {
        let mut state = QueueState::default();
        state.replace_pending(vec![task("c", "a")]);
        state.begin_next(PageHandle::new("p1"));
        state.dispatch_guard = Some(PageHandle::new("p1"));
        state.check_invariants().unwrap();

        let done = state.finish_current().unwrap();
        assert_eq!(done.label(), "a");
        assert!(state.active_page.is_none() && state.dispatch_guard.is_none());
        state.check_invariants().unwrap();
    }

    #[test]
    fn refill_skips_in_flight_task() {
        let mut state = QueueState::default();
        state.replace_pending(vec![task("c", "a")]);
        state.begin_next(PageHandle::new("p1"));

        let queued = state.replace_pending(vec![task("c", "a"), task("c", "b")]);
        assert_eq!(queued, 1);
        assert_eq!(state.pending_tasks[0].label(), "b");
        assert_eq!(state.campaign_stats["c"].pending, 1);
        state.check_invariants().unwrap();
    }

    #[test]
    fn invariant_violations_are_reported() {
        let mut state = QueueState {
            current_task: Some(task("c", "a")),
            ..Default::default()
        };
        assert!(matches!(state.check_invariants(), Err(Error::Invariant(_))));

        state.active_page = Some(PageHandle::new("p1"));
        state.pending_tasks.push_back(task("c", "a"));
        assert!(state.check_invariants().is_err());

        state.pending_tasks.clear();
        state.dispatch_guard = Some(PageHandle::new("other"));
        assert!(state.check_invariants().is_err());
    }
}
