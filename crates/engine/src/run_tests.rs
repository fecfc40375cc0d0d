// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn manager() -> Arc<RunManager> {
    Arc::new(RunManager::new(Arc::new(EventHub::new())))
}

fn issue() -> IssueRef {
    IssueRef::new("acme", "widgets", 7)
}

#[test]
fn begin_assigns_monotonic_run_ids() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager();

    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap();
    assert_eq!(guard.run_id(), "run-000001");
    guard.finish(Some(0), "completed", None);

    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap();
    assert_eq!(guard.run_id(), "run-000002");
    guard.finish(Some(0), "completed", None);
}

#[test]
fn second_begin_for_same_issue_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager();

    let _guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap();
    let err = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap_err();
    assert_eq!(err.code(), "RUN_ALREADY_ACTIVE");
    assert_eq!(err.kind(), "conflict");
}

#[test]
fn different_issues_run_concurrently() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let manager = manager();

    let _a = manager
        .begin(&issue(), dir_a.path(), "claude".to_string(), 5, None)
        .unwrap();
    let b = manager.begin(
        &IssueRef::new("acme", "anvils", 1),
        dir_b.path(),
        "claude".to_string(),
        5,
        None,
    );
    assert!(b.is_ok());
}

#[test]
fn finish_releases_the_slot_and_stamps_status() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager();

    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap();
    assert!(manager.status(&issue()).unwrap().running);

    guard.finish(Some(0), "completed", None);
    assert!(manager.status(&issue()).is_none());

    // The slot is free again.
    assert!(manager.begin(&issue(), dir.path(), "claude".to_string(), 5, None).is_ok());
}

#[test]
fn terminal_run_event_is_broadcast_on_finish() {
    let dir = tempfile::tempdir().unwrap();
    let hub = Arc::new(EventHub::new());
    let manager = Arc::new(RunManager::new(Arc::clone(&hub)));

    let seen = Arc::new(Mutex::new(Vec::<RunStatus>::new()));
    let sink = Arc::clone(&seen);
    hub.add_subscriber(Box::new(move |event| {
        if let HubEvent::Run(status) = event {
            sink.lock().push(status.clone());
        }
        Ok(())
    }));

    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 3, None)
        .unwrap();
    guard.finish(Some(0), "completed", None);

    let events = seen.lock();
    let first = events.first().unwrap();
    assert!(first.running);
    let last = events.last().unwrap();
    assert!(!last.running);
    assert_eq!(last.completion_reason.as_deref(), Some("completed"));
    assert_eq!(last.returncode, Some(0));
    assert!(last.ended_at.is_some());
}

#[test]
fn stop_cancels_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager();

    assert!(!manager.stop(&issue(), false));

    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap();
    let token = guard.cancel_token();
    assert!(!token.is_cancelled());

    assert!(manager.stop(&issue(), false));
    assert!(token.is_cancelled());
    assert!(manager.stop(&issue(), true));

    guard.finish(None, "cancelled", None);
    assert!(!manager.stop(&issue(), false));
}

#[test]
fn viewer_log_appends_and_broadcasts() {
    let dir = tempfile::tempdir().unwrap();
    let hub = Arc::new(EventHub::new());
    let manager = Arc::new(RunManager::new(Arc::clone(&hub)));

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    hub.add_subscriber(Box::new(move |event| {
        if let HubEvent::ViewerLogs(lines) = event {
            sink.lock().extend(lines.lines.iter().cloned());
        }
        Ok(())
    }));

    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 3, None)
        .unwrap();
    guard.viewer_log("phase plan starting");
    guard.viewer_log("phase plan done");

    let log_file = guard.status().viewer_log_file.unwrap();
    let content = std::fs::read_to_string(log_file).unwrap();
    assert_eq!(content, "phase plan starting\nphase plan done\n");
    assert_eq!(*seen.lock(), vec!["phase plan starting".to_string(), "phase plan done".to_string()]);

    guard.finish(Some(0), "completed", None);
}

#[test]
fn dropped_guard_releases_slot_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager();

    {
        let _guard = manager
            .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
            .unwrap();
        // Dropped without finish.
    }
    assert!(manager.status(&issue()).is_none());
    assert!(manager.begin(&issue(), dir.path(), "claude".to_string(), 5, None).is_ok());
}

#[test]
fn run_ids_skip_over_existing_run_dirs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("runs/run-000041")).unwrap();

    let manager = manager();
    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 1, None)
        .unwrap();
    assert_eq!(guard.run_id(), "run-000042");
    guard.finish(Some(0), "completed", None);
}

#[test]
fn update_mutates_status_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager();
    let guard = manager
        .begin(&issue(), dir.path(), "claude".to_string(), 5, None)
        .unwrap();

    guard.update(|status| {
        status.current_iteration = 3;
        status.completed_via_promise = true;
    });

    let status = manager.status(&issue()).unwrap();
    assert_eq!(status.current_iteration, 3);
    assert!(status.completed_via_promise);
    guard.finish(Some(0), "completed", None);
}
