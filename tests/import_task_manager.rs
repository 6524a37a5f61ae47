//! Single-slot import manager

use longrun::manager::{ImportTaskContext, ImportTaskManager};
use longrun::task::ProvidesTaskProgress;
use longrun::{ImportTaskManagerConfig, ProgressSinkSlot, TaskContext, TaskError, TaskProgressSink};
use pretty_assertions::assert_eq;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_only_one_import_at_a_time() {
    let manager = ImportTaskManager::new().unwrap();
    let (tx, rx) = mpsc::channel::<()>();
    let first = manager
        .submit_task(
            move || {
                rx.recv()?;
                Ok("imported")
            },
            "Import from backup",
            None,
        )
        .unwrap();
    assert_eq!(first.task_id(), 1);
    assert!(first.has_context(&ImportTaskContext));
    assert!(!first.is_cancellable());

    match manager.submit_task(|| Ok(()), "Second import", None) {
        Err(TaskError::AlreadyExecuting { existing }) => assert_eq!(existing.task_id(), 1),
        other => panic!("expected admission conflict, got {:?}", other),
    }

    tx.send(()).unwrap();
    manager.wait_until_task_completes().unwrap();
    assert!(manager.get_task().unwrap().is_finished());
    assert_eq!(manager.get_task().unwrap().result::<&str>(), Some(&"imported"));

    let second = manager.submit_task(|| Ok(()), "Second import", None).unwrap();
    assert_eq!(second.task_id(), 2);
    manager.wait_until_task_completes().unwrap();
    assert!(manager.shutdown_and_wait(Duration::from_secs(5)));
}

#[test]
fn test_next_import_accepted_right_after_wait() {
    let manager = ImportTaskManager::new().unwrap();
    for round in 1..=200u64 {
        let task = manager.submit_task(move || Ok(round), "Nightly import", None).unwrap();
        assert_eq!(task.task_id(), round);
        manager.wait_until_task_completes().unwrap();
        assert!(manager.get_task().unwrap().is_finished());
    }
}

#[test]
fn test_import_reports_progress() {
    let manager = ImportTaskManager::with_config(ImportTaskManagerConfig {
        thread_name_prefix: "DataImport".to_string(),
    })
    .unwrap();
    let slot = Arc::new(ProgressSinkSlot::new());
    let body_sink = slot.clone();
    let (name_tx, name_rx) = mpsc::channel();

    let task = manager
        .submit_task(
            move || {
                name_tx.send(thread::current().name().map(str::to_string))?;
                body_sink.make_progress(60, Some("Importing issues"), None);
                Ok(())
            },
            "Import",
            Some(slot.clone() as Arc<dyn ProvidesTaskProgress>),
        )
        .unwrap();

    manager.wait_until_task_completes().unwrap();
    assert_eq!(
        name_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        Some("DataImport-1".to_string())
    );
    let event = task
        .task_progress_indicator()
        .and_then(|indicator| indicator.last_progress_event())
        .unwrap();
    assert_eq!(event.task_progress, 60);
    assert_eq!(event.task_id, task.task_id());
    assert_eq!(task.progress_url(), ImportTaskContext.build_progress_url(task.task_id()));
}

#[test]
fn test_failure_surfaces_to_waiter() {
    let manager = ImportTaskManager::new().unwrap();
    manager
        .submit_task(|| -> anyhow::Result<()> { anyhow::bail!("corrupt backup") }, "Import", None)
        .unwrap();

    assert!(matches!(
        manager.wait_until_task_completes(),
        Err(TaskError::ExecutionFailed { task_id: 1, .. })
    ));
    assert!(manager.get_task().unwrap().is_finished());
}

#[test]
fn test_rejects_after_shutdown() {
    let manager = ImportTaskManager::new().unwrap();
    manager.shutdown_now();
    assert!(matches!(
        manager.submit_task(|| Ok(()), "Late import", None),
        Err(TaskError::Rejected { .. })
    ));
    assert!(manager.get_task().is_none());
}
