//! Runtime error types and their categorization.
//!
//! Every error in this module is local to a single task attempt. The step
//! runner turns them into `FAIL` report lines and moves on to the next
//! iteration; none of them ever stops another user or another step.

use std::fmt;
use thiserror::Error;

/// Errors raised while turning a request template into an HTTP call or
/// while performing that call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("missing parameter '{0}' in chain data")]
    MissingParameter(String),

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised by the task contract around a single invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0} mandatory and not present in previousData")]
    MissingPreviousData(String),

    #[error("status not expected: expected {expected}, got {actual}")]
    StatusNotExpected { expected: u16, actual: u16 },

    #[error("{0} mandatory and not present in nextData")]
    MissingNextData(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// Coarse classification of task failures, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A URL/body parameter or a previousData/nextData field was missing
    Parameter,

    /// The response status did not match the task's expected status
    Contract,

    /// The request template itself could not be turned into a call
    Template,

    /// Network, connection or response decoding failure
    Transport,
}

impl ErrorCategory {
    pub fn from_task_error(error: &TaskError) -> Self {
        match error {
            TaskError::MissingPreviousData(_) | TaskError::MissingNextData(_) => {
                ErrorCategory::Parameter
            }
            TaskError::StatusNotExpected { .. } => ErrorCategory::Contract,
            TaskError::Invoke(invoke) => Self::from_invoke_error(invoke),
        }
    }

    pub fn from_invoke_error(error: &InvokeError) -> Self {
        match error {
            InvokeError::MissingParameter(_) => ErrorCategory::Parameter,
            InvokeError::InvalidMethod(_)
            | InvokeError::InvalidUrl(_)
            | InvokeError::InvalidHeader(_) => ErrorCategory::Template,
            InvokeError::Transport(_) => ErrorCategory::Transport,
        }
    }

    /// Label used in structured log output.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Parameter => "parameter_error",
            ErrorCategory::Contract => "contract_error",
            ErrorCategory::Template => "template_error",
            ErrorCategory::Transport => "transport_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
