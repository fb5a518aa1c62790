//! Line-oriented result reporting.
//!
//! Every task attempt and every finished iteration produces one
//! [`ReportLine`]. Lines from concurrent users interleave freely, but each
//! line is always written in one piece.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// One event of a run, rendered as a pipe-delimited line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    /// `<step>|U<user>|<ns> ns|T<task>|<iteration>`
    TaskSucceeded {
        step: String,
        user: usize,
        latency: Duration,
        task: String,
        iteration: usize,
    },

    /// `<step>|U<user>|FAIL|<task>|<iteration>|<error>`
    TaskFailed {
        step: String,
        user: usize,
        task: String,
        iteration: usize,
        error: String,
    },

    /// `T|<step>|U<user>|<ns> ns|<iteration>`
    IterationTotal {
        step: String,
        user: usize,
        total: Duration,
        iteration: usize,
    },

    /// `Full Plan: <ns>`
    PlanElapsed { elapsed: Duration },
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportLine::TaskSucceeded {
                step,
                user,
                latency,
                task,
                iteration,
            } => write!(
                f,
                "{}|U{}|{} ns|T{}|{}",
                step,
                user,
                latency.as_nanos(),
                task,
                iteration
            ),
            ReportLine::TaskFailed {
                step,
                user,
                task,
                iteration,
                error,
            } => write!(f, "{}|U{}|FAIL|{}|{}|{}", step, user, task, iteration, error),
            ReportLine::IterationTotal {
                step,
                user,
                total,
                iteration,
            } => write!(
                f,
                "T|{}|U{}|{} ns|{}",
                step,
                user,
                total.as_nanos(),
                iteration
            ),
            ReportLine::PlanElapsed { elapsed } => write!(f, "Full Plan: {}", elapsed.as_nanos()),
        }
    }
}

/// Sink for report lines. Shared by every concurrent user of a run.
pub trait Reporter: Send + Sync {
    fn report(&self, line: ReportLine);
}

/// Writes each line to stdout under the stdout lock.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn report(&self, line: ReportLine) {
        let rendered = format!("{}\n", line);
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(rendered.as_bytes()) {
            warn!(error = %e, "Failed to write report line");
        }
    }
}

/// Keeps every reported line in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<ReportLine>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ReportLine> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Lines rendered exactly as [`StdoutReporter`] would print them.
    pub fn rendered(&self) -> Vec<String> {
        self.lines().iter().map(ToString::to_string).collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, line: ReportLine) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}
