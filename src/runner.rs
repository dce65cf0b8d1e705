//! Task orchestration: drive each task end-to-end, contain its failures.
//!
//! A task moves through `Pending → Resolving → Fetching → Filtering →
//! Writing → Done`, or lands in `Failed` from any of those. A failed task
//! is reported and the batch moves on — one bad task never takes the rest
//! down. The single exception is an `Auth` failure: without a session no
//! task can proceed, so the batch stops where it stands.

use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use crate::assembler;
use crate::board::RemoteBoard;
use crate::config::Task;
use crate::error::TaskError;
use crate::output;
use crate::strategy;

/// Where a task ended up (or got to, when it failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Resolving,
    Fetching,
    Filtering,
    Writing,
    Done,
    Failed,
}

/// Outcome of one task.
#[derive(Debug)]
pub struct TaskReport {
    /// Config-file tag of the task, or `"invalid"` when the entry never
    /// parsed into a task at all.
    pub kind: &'static str,
    pub board: String,
    pub output: Option<String>,
    pub state: TaskState,
    /// How far the task got before failing.
    pub reached: TaskState,
    pub found: usize,
    pub error: Option<TaskError>,
}

impl TaskReport {
    fn started(task: &Task) -> Self {
        TaskReport {
            kind: task.kind_name(),
            board: task.board.clone(),
            output: task.output.clone(),
            state: TaskState::Pending,
            reached: TaskState::Pending,
            found: 0,
            error: None,
        }
    }

    /// A config entry that failed to parse; there is no task to describe.
    fn invalid(err: TaskError) -> Self {
        TaskReport {
            kind: "invalid",
            board: String::new(),
            output: None,
            state: TaskState::Failed,
            reached: TaskState::Pending,
            found: 0,
            error: Some(err),
        }
    }

    fn advance(&mut self, state: TaskState) {
        self.state = state;
        self.reached = state;
    }

    fn fail(mut self, err: TaskError) -> Self {
        error!(kind = self.kind, board = %self.board, reached = ?self.reached, error = %err,
            "task failed");
        self.state = TaskState::Failed;
        self.error = Some(err);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.state == TaskState::Done
    }
}

/// Run one task to completion.
///
/// `today` pins clock windows to a calendar date; production passes the
/// current local date.
#[instrument(level = "info", skip(board, task), fields(kind = task.kind_name(), board = %task.board))]
pub async fn run_task<B: RemoteBoard>(board: &mut B, task: &Task, today: NaiveDate) -> TaskReport {
    let mut report = TaskReport::started(task);
    info!(output = ?task.output, "task starting");

    report.advance(TaskState::Resolving);
    let plan = match strategy::resolve(board, task, today).await {
        Ok(plan) => plan,
        Err(e) => return report.fail(e),
    };

    report.advance(TaskState::Fetching);
    let articles = match assembler::assemble(board, &task.board, &plan).await {
        Ok(articles) => articles,
        Err(e) => return report.fail(e),
    };
    report.advance(TaskState::Filtering);
    report.found = articles.len();

    if let Some(path) = &task.output {
        report.advance(TaskState::Writing);
        if let Err(e) = output::write_articles(&articles, path).await {
            return report.fail(e);
        }
    } else {
        info!(found = report.found, "task has no output sink; result dropped");
    }

    report.advance(TaskState::Done);
    info!(found = report.found, "task done");
    report
}

/// Run a whole batch, one task at a time.
///
/// Per-task failures are recorded and the batch continues; a fatal
/// (session-level) failure stops the batch at the failing task.
pub async fn run_batch<B: RemoteBoard>(
    board: &mut B,
    tasks: Vec<Result<Task, TaskError>>,
    today: NaiveDate,
) -> Vec<TaskReport> {
    let total = tasks.len();
    let mut reports = Vec::with_capacity(total);

    for (position, entry) in tasks.into_iter().enumerate() {
        info!(task = position + 1, total, "----------------------------------------");
        let report = match entry {
            Ok(task) => run_task(board, &task, today).await,
            Err(e) => {
                warn!(task = position + 1, error = %e, "skipping unparseable task entry");
                TaskReport::invalid(e)
            }
        };

        let fatal = report.error.as_ref().is_some_and(|e| e.is_fatal());
        reports.push(report);
        if fatal {
            error!(
                completed = reports.len(),
                total, "session lost; aborting remaining tasks"
            );
            break;
        }
    }

    reports
}
