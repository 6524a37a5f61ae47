//! Bulk move demo
//!
//! Submits a two-phase "move issues" task that reports progress through a
//! chain of sinks, shows admission control rejecting a duplicate, then
//! cancels a second, cooperative task.

use anyhow::Result;
use longrun::manager::TaskManager;
use longrun::progress::{
    create_percentage_sinks_for_range, CompositeProgressSink, SharedProgressSink,
    StatefulTaskProgressSink, TaskProgressSink, TimeBasedLogSink,
};
use longrun::task::{TaskContext, TaskId, TaskInfoSlot, TaskSubmission};
use longrun::{init_tracing, ProgressSinkSlot, TaskError, TaskManagerConfig};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Debug, PartialEq, Eq, Hash)]
struct BulkMoveContext {
    project: String,
}

impl TaskContext for BulkMoveContext {
    fn build_progress_url(&self, task_id: TaskId) -> String {
        format!(
            "/secure/views/bulkedit/BulkMigrateProgress.jspa?project={}&taskId={}",
            self.project, task_id
        )
    }
}

fn move_issues(progress: SharedProgressSink, issues: u32) -> Result<u32> {
    let sink = CompositeProgressSink::new(vec![progress])
        .with(Arc::new(TimeBasedLogSink::new("bulk move", Duration::from_millis(200), None)));
    let phases = create_percentage_sinks_for_range(0, 100, 2, Arc::new(sink))?;

    for step in 0..=10 {
        phases[0].make_progress(step * 10, Some("Validating"), None);
        thread::sleep(Duration::from_millis(20));
    }

    let moving: SharedProgressSink = Arc::new(phases[1].clone());
    let counter = Arc::new(StatefulTaskProgressSink::new(0, 100, 0, moving)?);
    let per_issue = counter.create_step_sink_view(0, 100, i64::from(issues))?;
    for issue in 1..=issues {
        let message = format!("{} of {}", issue, issues);
        per_issue.make_progress_increment(1, Some("Moving"), Some(&message));
        thread::sleep(Duration::from_millis(30));
    }
    Ok(issues)
}

fn main() -> Result<()> {
    init_tracing(Level::INFO);

    let config = TaskManagerConfig::builder()
        .max_threads(2)
        .thread_name_prefix("BulkEdit")
        .build()?;
    let manager = TaskManager::builder().with_config(config).build()?;
    let context = Arc::new(BulkMoveContext {
        project: "HSP".to_string(),
    });

    let slot = Arc::new(ProgressSinkSlot::new());
    let body_slot = slot.clone();
    let submitted = manager.submit(
        TaskSubmission::new(
            move || move_issues(body_slot.sink(), 12),
            "Move 12 issues to HSP",
            context.clone(),
        )
        .submitted_by("admin")
        .with_progress(slot),
    )?;
    info!(task_id = submitted.task_id(), url = submitted.progress_url(), "Submitted bulk move");

    match manager.submit_task(|| Ok(0u32), "Move again", context, false) {
        Err(TaskError::AlreadyExecuting { existing }) => {
            info!(task_id = existing.task_id(), "Duplicate bulk move refused")
        }
        other => anyhow::bail!(
            "expected the duplicate to be refused, got {:?}",
            other.map(|d| d.task_id())
        ),
    }

    let info_slot = Arc::new(TaskInfoSlot::new());
    let body_info = info_slot.clone();
    let reindex = manager.submit(
        TaskSubmission::new(
            move || {
                let mut rounds = 0u32;
                while !body_info.is_cancelled() {
                    rounds += 1;
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(rounds)
            },
            "Reindex HSP",
            Arc::new(BulkMoveContext {
                project: "HSP-index".to_string(),
            }),
        )
        .cancellable(true)
        .with_task_info(info_slot),
    )?;

    thread::sleep(Duration::from_millis(100));
    manager.cancel_task(reindex.task_id())?;
    manager.wait_until_task_completes(submitted.task_id())?;

    let moved = manager.get_task(submitted.task_id());
    if let Some(task) = moved {
        let last = task.task_progress_indicator().and_then(|i| i.last_progress_event());
        info!(
            moved = ?task.result::<u32>(),
            progress = ?last.map(|e| e.task_progress),
            elapsed_ms = task.elapsed_run_time().as_millis() as u64,
            "Bulk move finished"
        );
    }

    if !manager.shutdown_and_wait(Duration::from_secs(5)) {
        anyhow::bail!("tasks still running at shutdown");
    }
    for task in manager.get_all_tasks() {
        info!(
            task_id = task.task_id(),
            description = task.description(),
            cancelled = task.is_cancelled(),
            finished = task.is_finished(),
            "Final state"
        );
    }
    Ok(())
}
