use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::errors::ErrorCategory;
use crate::executor::run_task;
use crate::plan::{ChainData, Step};
use crate::report::{ReportLine, Reporter};
use crate::transport::Transport;

/// Counters for one finished step.
///
/// Informational only: the report line stream is the actual output of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub step_name: String,
    pub users: usize,
    pub iterations_per_user: usize,

    /// Iterations started across all users
    pub iterations: usize,

    /// Iterations aborted by a task failure
    pub failed_iterations: usize,

    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
}

impl StepSummary {
    fn absorb(&mut self, user: &UserSummary) {
        self.iterations += user.iterations;
        self.failed_iterations += user.failed_iterations;
        self.tasks_succeeded += user.tasks_succeeded;
        self.tasks_failed += user.tasks_failed;
    }
}

#[derive(Debug, Default)]
struct UserSummary {
    iterations: usize,
    failed_iterations: usize,
    tasks_succeeded: usize,
    tasks_failed: usize,
}

/// Outcome of one run of a step's task chain by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationResult {
    pub success: bool,

    /// Sum of the latencies of the tasks that succeeded
    pub total: Duration,

    /// Tasks that succeeded before the chain ended or broke
    pub tasks_succeeded: usize,
}

/// Runs a step: one worker per concurrent user, each replaying the task
/// chain `iterations_per_user` times.
///
/// Returns only after every worker has finished. Failures stay inside the
/// iteration that produced them and are reported as `FAIL` lines.
pub async fn run_step(
    step: Arc<Step>,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn Reporter>,
) -> StepSummary {
    let iterations_per_user = step.iterations_per_user();

    info!(
        step = %step.name,
        users = step.concurrent_users,
        iterations_per_user,
        tasks = step.tasks.len(),
        "Starting step"
    );

    if step.num_petitions % step.concurrent_users.max(1) != 0 {
        debug!(
            step = %step.name,
            petitions = step.num_petitions,
            users = step.concurrent_users,
            "Petitions not evenly divisible by users, remainder dropped"
        );
    }

    let mut handles = Vec::with_capacity(step.concurrent_users);
    for user in 0..step.concurrent_users {
        let step = Arc::clone(&step);
        let transport = Arc::clone(&transport);
        let reporter = Arc::clone(&reporter);

        let handle = tokio::spawn(async move {
            run_user(
                &step,
                user,
                iterations_per_user,
                transport.as_ref(),
                reporter.as_ref(),
            )
            .await
        });
        handles.push(handle);
    }

    let mut summary = StepSummary {
        step_name: step.name.clone(),
        users: step.concurrent_users,
        iterations_per_user,
        ..StepSummary::default()
    };

    for (user, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(user_summary) => summary.absorb(&user_summary),
            Err(e) => error!(step = %step.name, user, error = %e, "User worker terminated abnormally"),
        }
    }

    info!(
        step = %step.name,
        iterations = summary.iterations,
        failed_iterations = summary.failed_iterations,
        "Step completed"
    );

    summary
}

async fn run_user(
    step: &Step,
    user: usize,
    iterations: usize,
    transport: &dyn Transport,
    reporter: &dyn Reporter,
) -> UserSummary {
    debug!(step = %step.name, user, iterations, "User worker starting");

    let mut summary = UserSummary::default();
    for iteration in 0..iterations {
        let result = run_iteration(step, user, iteration, transport, reporter).await;

        summary.iterations += 1;
        summary.tasks_succeeded += result.tasks_succeeded;
        if !result.success {
            summary.failed_iterations += 1;
            summary.tasks_failed += 1;
        }
    }
    summary
}

/// Runs the step's task chain once, in declared order, starting from empty
/// chain data. Stops at the first failing task.
///
/// Reports one line per task attempt and a closing total line, which is
/// written whether or not the chain completed.
pub async fn run_iteration(
    step: &Step,
    user: usize,
    iteration: usize,
    transport: &dyn Transport,
    reporter: &dyn Reporter,
) -> IterationResult {
    let mut chain = ChainData::new();
    let mut total = Duration::ZERO;
    let mut tasks_succeeded = 0;
    let mut success = true;

    for task in &step.tasks {
        match run_task(transport, task, &chain).await {
            Ok(outcome) => {
                reporter.report(ReportLine::TaskSucceeded {
                    step: step.name.clone(),
                    user,
                    latency: outcome.latency,
                    task: task.name.clone(),
                    iteration,
                });
                total += outcome.latency;
                tasks_succeeded += 1;
                chain = outcome.next;
            }
            Err(e) => {
                warn!(
                    step = %step.name,
                    user,
                    iteration,
                    task = %task.name,
                    error = %e,
                    error_category = %ErrorCategory::from_task_error(&e),
                    "Task failed, aborting iteration"
                );
                reporter.report(ReportLine::TaskFailed {
                    step: step.name.clone(),
                    user,
                    task: task.name.clone(),
                    iteration,
                    error: e.to_string(),
                });
                success = false;
                break;
            }
        }
    }

    reporter.report(ReportLine::IterationTotal {
        step: step.name.clone(),
        user,
        total,
        iteration,
    });

    IterationResult {
        success,
        total,
        tasks_succeeded,
    }
}
