//! The durable store across reopen.

mod common;

use common::task;
use outreach_pilot::page::PageHandle;
use outreach_pilot::store::{LogEntry, Severity, TaskStore};
use outreach_pilot::Error;

#[tokio::test]
async fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    {
        let store = TaskStore::open(&path, 50).unwrap();
        store
            .update(|s| {
                s.replace_pending(vec![task("c1", "jane-doe"), task("c1", "alex-roe")]);
                s.begin_next(PageHandle::new("sim-1"));
            })
            .await
            .unwrap();
        store
            .append_log(LogEntry::new("🚀 Opening profile: jane-doe", Severity::Action))
            .await
            .unwrap();
    }

    let store = TaskStore::open(&path, 50).unwrap();
    let state = store.snapshot().await.unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.current_task, Some(task("c1", "jane-doe")));
    assert_eq!(state.active_page, Some(PageHandle::new("sim-1")));
    assert_eq!(state.pending_tasks.len(), 1);
    assert_eq!(state.campaign_stats["c1"].pending, 2);
    assert_eq!(store.logs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn log_keeps_the_newest_fifty() {
    let store = TaskStore::open_in_memory(50).unwrap();
    for i in 0..55 {
        store
            .append_log(LogEntry::new(format!("entry {i}"), Severity::Info))
            .await
            .unwrap();
    }
    let logs = store.logs().await.unwrap();
    assert_eq!(logs.len(), 50);
    assert_eq!(logs[0].message, "entry 54");
    assert_eq!(logs[49].message, "entry 5");

    store.clear_logs().await.unwrap();
    assert!(store.logs().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_breaking_an_invariant_is_not_committed() {
    let store = TaskStore::open_in_memory(50).unwrap();
    store
        .update(|s| {
            s.replace_pending(vec![task("c1", "jane-doe")]);
        })
        .await
        .unwrap();

    let err = store
        .update(|s| s.current_task = s.pending_tasks.front().cloned())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invariant(_)));

    let state = store.snapshot().await.unwrap();
    assert_eq!(state.version, 1);
    assert!(state.current_task.is_none());
}
