//! Plan execution: steps in order, one after another.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::errors::InvokeError;
use crate::plan::Plan;
use crate::report::{ReportLine, Reporter};
use crate::transport::{HttpTransport, Transport};
use crate::worker::{run_step, StepSummary};

/// Counters for a finished plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub plan_name: String,
    pub steps: Vec<StepSummary>,
    pub elapsed: Duration,
}

/// Run every step of `plan` in order over an already configured transport.
///
/// A step's users all finish before the next step starts. The last report
/// line is the wall-clock time of the whole plan.
pub async fn run_plan(
    plan: &Plan,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn Reporter>,
) -> PlanSummary {
    info!(
        plan = %plan.name,
        plan_type = %plan.plan_type,
        base_url = %plan.base_url,
        auth = plan.auth.label(),
        steps = plan.steps.len(),
        "Starting plan"
    );

    let start = Instant::now();
    let mut steps = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        let summary = run_step(Arc::clone(step), Arc::clone(&transport), Arc::clone(&reporter)).await;
        steps.push(summary);
    }
    let elapsed = start.elapsed();

    reporter.report(ReportLine::PlanElapsed { elapsed });
    info!(plan = %plan.name, elapsed_ms = elapsed.as_millis() as u64, "Plan completed");

    PlanSummary {
        plan_name: plan.name.clone(),
        steps,
        elapsed,
    }
}

/// Configure an [`HttpTransport`] from the plan's base URL, base path and
/// authentication, then run the plan over it.
pub async fn run(
    plan: &Plan,
    client: reqwest::Client,
    reporter: Arc<dyn Reporter>,
) -> Result<PlanSummary, InvokeError> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::for_plan(client, plan)?);
    Ok(run_plan(plan, transport, reporter).await)
}
