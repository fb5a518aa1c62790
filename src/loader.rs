//! Loading plan definitions from a directory tree.
//!
//! Layout:
//! ```text
//! <root>/requests/*.json
//! <root>/tasks/*.json
//! <root>/steps/*.json
//! <root>/plan.json        (or any other plan file name)
//! ```
//!
//! Requests are loaded first, then tasks (resolving their request), then
//! steps (resolving their tasks), and finally the plan (resolving its
//! steps). Any unreadable file, malformed JSON, unresolved reference or
//! invalid value aborts loading: the engine only ever runs fully resolved
//! plans.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::plan::{Auth, Plan, Request, Step, Task};

pub const DEFAULT_PLAN_FILE: &str = "plan.json";

/// Errors that abort loading. All of them are fatal for the run.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} '{name}' referenced by '{referenced_by}' does not exist")]
    UnresolvedReference {
        kind: &'static str,
        name: String,
        referenced_by: String,
    },

    #[error("Duplicate {kind} name '{name}' in {path:?}")]
    DuplicateName {
        kind: &'static str,
        name: String,
        path: PathBuf,
    },

    #[error("Invalid definition in {path:?}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Request definition as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefinition {
    pub name: String,

    pub method: String,

    /// Optional base URL override
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub path: String,

    #[serde(rename = "paramsURL", alias = "paramsUrl", default)]
    pub params_url: Vec<String>,

    #[serde(rename = "ParamsBody", alias = "paramsBody", default)]
    pub params_body: Vec<String>,

    #[serde(default)]
    pub body: Map<String, Value>,
}

/// Task definition as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,

    #[serde(rename = "previusData", alias = "previousData", default)]
    pub previous_data: Vec<String>,

    #[serde(rename = "nextData", default)]
    pub next_data: Vec<String>,

    #[serde(rename = "expectedStatus")]
    pub expected_status: u16,

    /// Name of the request this task invokes
    pub request: String,
}

/// Step definition as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,

    #[serde(rename = "numPetitions")]
    pub num_petitions: usize,

    #[serde(rename = "concurrentUsers")]
    pub concurrent_users: usize,

    /// Task names, in execution order
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// Plan definition as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDefinition {
    #[serde(rename = "type", default)]
    pub plan_type: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "authType", default)]
    pub auth_type: String,

    #[serde(rename = "authUser", default)]
    pub auth_user: String,

    #[serde(rename = "authPass", default)]
    pub auth_pass: String,

    #[serde(rename = "authEndpoint", default)]
    pub auth_endpoint: String,

    pub url: String,

    #[serde(default)]
    pub path: String,

    /// Step names, in execution order
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A fully resolved plan plus the catalogs it was built from.
#[derive(Debug, Clone)]
pub struct LoadedPlan {
    pub plan: Plan,
    pub requests: HashMap<String, Arc<Request>>,
    pub tasks: HashMap<String, Arc<Task>>,
    pub steps: HashMap<String, Arc<Step>>,
}

/// Load and resolve every definition under `root`.
pub fn load_plan(root: &Path, plan_file: &str) -> Result<LoadedPlan, LoadError> {
    let mut requests = HashMap::new();
    for (path, def) in read_definitions::<RequestDefinition>(&root.join("requests"))? {
        let request = Arc::new(build_request(&path, def)?);
        insert_unique(&mut requests, "request", request.name.clone(), request, &path)?;
    }

    let mut tasks = HashMap::new();
    for (path, def) in read_definitions::<TaskDefinition>(&root.join("tasks"))? {
        let task = Arc::new(build_task(def, &requests)?);
        insert_unique(&mut tasks, "task", task.name.clone(), task, &path)?;
    }

    let mut steps = HashMap::new();
    for (path, def) in read_definitions::<StepDefinition>(&root.join("steps"))? {
        let step = Arc::new(build_step(&path, def, &tasks)?);
        insert_unique(&mut steps, "step", step.name.clone(), step, &path)?;
    }

    let plan_path = root.join(plan_file);
    let plan_def: PlanDefinition = read_definition(&plan_path)?;
    let plan = build_plan(&plan_path, plan_def, &steps)?;

    debug!(
        plan = %plan.name,
        requests = requests.len(),
        tasks = tasks.len(),
        steps = steps.len(),
        "Plan definitions loaded"
    );

    Ok(LoadedPlan {
        plan,
        requests,
        tasks,
        steps,
    })
}

fn read_definition<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every `*.json` file of `dir`, sorted by file name.
fn read_definitions<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>, LoadError> {
    let io_error = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let def = read_definition(&path)?;
            debug!(path = %path.display(), "Loaded definition");
            Ok((path, def))
        })
        .collect()
}

fn insert_unique<T>(
    catalog: &mut HashMap<String, Arc<T>>,
    kind: &'static str,
    name: String,
    value: Arc<T>,
    path: &Path,
) -> Result<(), LoadError> {
    if catalog.contains_key(&name) {
        return Err(LoadError::DuplicateName {
            kind,
            name,
            path: path.to_path_buf(),
        });
    }
    catalog.insert(name, value);
    Ok(())
}

fn build_request(path: &Path, def: RequestDefinition) -> Result<Request, LoadError> {
    let method = Method::from_bytes(def.method.trim().to_uppercase().as_bytes()).map_err(|_| {
        LoadError::Invalid {
            path: path.to_path_buf(),
            message: format!("invalid HTTP method '{}'", def.method),
        }
    })?;

    Ok(Request {
        name: def.name,
        method,
        base_url: def.url.filter(|url| !url.is_empty()),
        path: def.path,
        url_params: def.params_url,
        body_params: def.params_body,
        body: def.body,
    })
}

fn build_task(def: TaskDefinition, requests: &HashMap<String, Arc<Request>>) -> Result<Task, LoadError> {
    let request = requests
        .get(&def.request)
        .cloned()
        .ok_or_else(|| LoadError::UnresolvedReference {
            kind: "request",
            name: def.request.clone(),
            referenced_by: def.name.clone(),
        })?;

    Ok(Task {
        name: def.name,
        request,
        previous_data: def.previous_data,
        next_data: def.next_data,
        expected_status: def.expected_status,
    })
}

fn build_step(
    path: &Path,
    def: StepDefinition,
    tasks: &HashMap<String, Arc<Task>>,
) -> Result<Step, LoadError> {
    if def.concurrent_users == 0 {
        return Err(LoadError::Invalid {
            path: path.to_path_buf(),
            message: format!("step '{}' must have at least one concurrent user", def.name),
        });
    }

    let resolved = def
        .tasks
        .iter()
        .map(|name| {
            tasks
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::UnresolvedReference {
                    kind: "task",
                    name: name.clone(),
                    referenced_by: def.name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Step {
        name: def.name,
        num_petitions: def.num_petitions,
        concurrent_users: def.concurrent_users,
        tasks: resolved,
    })
}

fn build_plan(
    path: &Path,
    def: PlanDefinition,
    steps: &HashMap<String, Arc<Step>>,
) -> Result<Plan, LoadError> {
    let invalid = |message: String| LoadError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    reqwest::Url::parse(&def.url).map_err(|e| invalid(format!("invalid url '{}': {}", def.url, e)))?;

    let auth = match def.auth_type.trim().to_lowercase().as_str() {
        "" | "none" => Auth::None,
        "basic" => Auth::Basic {
            user: def.auth_user,
            password: def.auth_pass,
        },
        "bearer" | "oauth" => Auth::Bearer(def.auth_pass),
        "jwt" => Auth::Jwt(def.auth_pass),
        other => return Err(invalid(format!("unknown authType '{}'", other))),
    };

    let resolved = def
        .steps
        .iter()
        .map(|name| {
            steps
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::UnresolvedReference {
                    kind: "step",
                    name: name.clone(),
                    referenced_by: def.name.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Plan {
        plan_type: def.plan_type,
        name: def.name,
        auth,
        auth_endpoint: Some(def.auth_endpoint).filter(|e| !e.is_empty()),
        base_url: def.url,
        base_path: def.path,
        steps: resolved,
    })
}
