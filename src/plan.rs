//! Plan definitions and the per-iteration chain data context.
//!
//! A plan is a tree of immutable definitions: a [`Plan`] holds ordered
//! [`Step`]s, a step holds ordered [`Task`]s, and each task wraps exactly one
//! [`Request`]. All cross references are resolved when the tree is built, so
//! the engine never looks anything up by name at run time. Definitions are
//! shared between concurrent users through `Arc`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An HTTP call template.
///
/// # Example
/// ```
/// use rust_loadplan::plan::Request;
/// use reqwest::Method;
///
/// let request = Request {
///     name: "get-user".to_string(),
///     method: Method::GET,
///     base_url: None,
///     path: "/users/{{id}}".to_string(),
///     url_params: vec!["id".to_string()],
///     body_params: vec![],
///     body: serde_json::Map::new(),
/// };
/// assert_eq!(request.url_params.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Unique name of this request
    pub name: String,

    pub method: Method,

    /// Base URL that replaces the plan's base URL for this request only
    pub base_url: Option<String>,

    /// Path template; may contain `{{param}}` placeholders
    pub path: String,

    /// Chain data fields substituted into the path
    pub url_params: Vec<String>,

    /// Chain data fields injected into the body
    pub body_params: Vec<String>,

    /// Body template. Never mutated; each call works on a clone.
    pub body: Map<String, Value>,
}

/// One contract-checked invocation of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub request: Arc<Request>,

    /// Fields that must be present and non-empty in the incoming chain data
    pub previous_data: Vec<String>,

    /// Fields extracted from the response into the next chain data
    pub next_data: Vec<String>,

    pub expected_status: u16,
}

/// A chain of tasks replayed by a number of concurrent users.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,

    /// Total petitions, split evenly between users
    pub num_petitions: usize,

    pub concurrent_users: usize,

    pub tasks: Vec<Arc<Task>>,
}

impl Step {
    /// Number of iterations each user runs.
    ///
    /// Petitions are split by integer division and the remainder is dropped,
    /// so `10` petitions over `3` users gives `3` iterations per user. A step
    /// without users runs nothing.
    pub fn iterations_per_user(&self) -> usize {
        self.num_petitions
            .checked_div(self.concurrent_users)
            .unwrap_or(0)
    }
}

/// Authentication applied to every call of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    None,

    Basic {
        user: String,
        password: String,
    },

    /// `Authorization: Bearer <token>`
    Bearer(String),

    /// `Authorization: jwt <token>`
    Jwt(String),
}

impl Auth {
    /// Value of the `Authorization` header for this auth mode, if any.
    ///
    /// # Example
    /// ```
    /// use rust_loadplan::plan::Auth;
    ///
    /// let auth = Auth::Basic { user: "user".into(), password: "pass".into() };
    /// assert_eq!(auth.authorization_header().unwrap(), "Basic dXNlcjpwYXNz");
    /// assert_eq!(Auth::None.authorization_header(), None);
    /// ```
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Auth::None => None,
            Auth::Basic { user, password } => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", user, password))
            )),
            Auth::Bearer(token) => Some(format!("Bearer {}", token)),
            Auth::Jwt(token) => Some(format!("jwt {}", token)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Basic { .. } => "basic",
            Auth::Bearer(_) => "bearer",
            Auth::Jwt(_) => "jwt",
        }
    }
}

/// Top-level ordered sequence of steps plus the target configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Free-form plan type, kept for reporting
    pub plan_type: String,

    pub name: String,

    pub auth: Auth,

    /// Informational only; the engine never calls it
    pub auth_endpoint: Option<String>,

    /// Target base URL (e.g., "https://api.example.com")
    pub base_url: String,

    /// Base path resolved against `base_url`
    pub base_path: String,

    pub steps: Vec<Arc<Step>>,
}

/// Fields threaded from one task to the next within a single iteration.
///
/// Each iteration starts with an empty context and replaces it wholesale
/// after every task. A context is owned by exactly one iteration of one
/// user and is never shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainData {
    fields: HashMap<String, Value>,
}

impl ChainData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// True when the field exists and is neither `null` nor an empty string.
    pub fn has_value(&self, name: &str) -> bool {
        match self.fields.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// String form of a scalar field, for path substitution.
    ///
    /// Strings are returned verbatim and numbers in their decimal JSON form.
    /// Missing fields, empty strings and non-scalar values yield `None`.
    ///
    /// # Example
    /// ```
    /// use rust_loadplan::plan::ChainData;
    /// use serde_json::json;
    ///
    /// let mut chain = ChainData::new();
    /// chain.insert("id", json!(42));
    /// chain.insert("name", json!("alice"));
    /// assert_eq!(chain.scalar_string("id").as_deref(), Some("42"));
    /// assert_eq!(chain.scalar_string("name").as_deref(), Some("alice"));
    /// assert_eq!(chain.scalar_string("missing"), None);
    /// ```
    pub fn scalar_string(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for ChainData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
