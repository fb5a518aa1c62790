//! Request invocation and task contracts.
//!
//! [`invoke_request`] turns a [`Request`] template plus the current
//! [`ChainData`] into one HTTP call. [`run_task`] wraps that call with the
//! task's data contract: required input fields, the expected status, and the
//! fields extracted into the next chain data context.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::{InvokeError, TaskError};
use crate::plan::{ChainData, Request, Task};
use crate::transport::{HttpCall, Transport};

/// Result of a single HTTP invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Decoded response object, if the response carried one
    pub fields: Option<Map<String, Value>>,

    pub status: u16,

    /// Wall-clock time spent in the transport
    pub latency: Duration,
}

/// Result of a task whose contract held.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Chain data for the next task; holds exactly the task's nextData fields
    pub next: ChainData,

    pub latency: Duration,
}

/// Substitute every declared URL parameter into the request's path template.
///
/// Every declared parameter must resolve to a non-empty scalar in `chain`,
/// otherwise the whole call fails. The template is scanned once, left to
/// right: substituted values are copied verbatim and never rescanned, and
/// placeholders whose name is not declared are left as written.
///
/// # Example
/// ```
/// use rust_loadplan::executor::resolve_path;
/// use rust_loadplan::plan::{ChainData, Request};
/// use serde_json::json;
///
/// let request = Request {
///     name: "get-user".to_string(),
///     method: reqwest::Method::GET,
///     base_url: None,
///     path: "/users/{{id}}".to_string(),
///     url_params: vec!["id".to_string()],
///     body_params: vec![],
///     body: serde_json::Map::new(),
/// };
/// let mut chain = ChainData::new();
/// chain.insert("id", json!("42"));
/// assert_eq!(resolve_path(&request, &chain).unwrap(), "/users/42");
/// ```
pub fn resolve_path(request: &Request, chain: &ChainData) -> Result<String, InvokeError> {
    let values = request
        .url_params
        .iter()
        .map(|param| {
            chain
                .scalar_string(param)
                .map(|value| (param.as_str(), value))
                .ok_or_else(|| InvokeError::MissingParameter(param.clone()))
        })
        .collect::<Result<HashMap<&str, String>, _>>()?;

    let mut path = String::with_capacity(request.path.len());
    let mut rest = request.path.as_str();
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };

        path.push_str(&rest[..open]);
        match values.get(&after_open[..close]) {
            Some(value) => path.push_str(value),
            None => path.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }
    path.push_str(rest);

    Ok(path)
}

/// Build the body for one call: a clone of the template with every declared
/// body parameter overwritten from `chain`.
pub fn build_body(request: &Request, chain: &ChainData) -> Result<Map<String, Value>, InvokeError> {
    let mut body = request.body.clone();
    for param in &request.body_params {
        let value = chain
            .get(param)
            .ok_or_else(|| InvokeError::MissingParameter(param.clone()))?;
        body.insert(param.clone(), value.clone());
    }
    Ok(body)
}

/// Perform one call of `request` with the given chain data.
///
/// Parameters are resolved before anything goes on the wire; a missing
/// parameter never reaches the transport. Errors are never retried.
pub async fn invoke_request(
    transport: &dyn Transport,
    request: &Request,
    chain: &ChainData,
) -> Result<Invocation, InvokeError> {
    let path = resolve_path(request, chain)?;
    let body = build_body(request, chain)?;

    let call = HttpCall {
        method: request.method.clone(),
        base_url: request.base_url.clone(),
        path,
        body,
    };

    let start = Instant::now();
    let response = transport.send(call).await?;
    let latency = start.elapsed();

    debug!(
        request = %request.name,
        status = response.status,
        latency_ns = latency.as_nanos() as u64,
        "Received response"
    );

    Ok(Invocation {
        fields: response.body,
        status: response.status,
        latency,
    })
}

/// Run one task against the incoming chain data.
///
/// On success the returned [`TaskOutcome`] carries the chain data for the
/// next task. On failure the caller must stop the current iteration.
pub async fn run_task(
    transport: &dyn Transport,
    task: &Task,
    chain: &ChainData,
) -> Result<TaskOutcome, TaskError> {
    if let Some(field) = task.previous_data.iter().find(|f| !chain.has_value(f)) {
        return Err(TaskError::MissingPreviousData(field.clone()));
    }

    let invocation = invoke_request(transport, &task.request, chain).await?;

    if invocation.status != task.expected_status {
        return Err(TaskError::StatusNotExpected {
            expected: task.expected_status,
            actual: invocation.status,
        });
    }

    let fields = invocation.fields.unwrap_or_default();
    let mut next = ChainData::new();
    for name in &task.next_data {
        let value = fields
            .get(name)
            .ok_or_else(|| TaskError::MissingNextData(name.clone()))?;
        next.insert(name.clone(), value.clone());
    }

    Ok(TaskOutcome {
        next,
        latency: invocation.latency,
    })
}
