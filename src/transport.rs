//! HTTP transport capability.
//!
//! The engine never talks to reqwest directly. It hands an [`HttpCall`] to a
//! [`Transport`] and gets back an [`HttpResponse`]. The production
//! implementation is [`HttpTransport`]; tests plug in their own.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::InvokeError;
use crate::plan::{Auth, Plan};

/// A fully resolved call, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: Method,

    /// Replaces the transport's base URL when set
    pub base_url: Option<String>,

    /// Path with every placeholder already substituted
    pub path: String,

    /// JSON body; not sent when empty
    pub body: Map<String, Value>,
}

/// Status and decoded body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,

    /// Present only when the response body was a JSON object
    pub body: Option<Map<String, Value>>,
}

/// Something that can perform one HTTP call.
///
/// Implementations are shared by every concurrent user of a run and must be
/// safe for concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: HttpCall) -> Result<HttpResponse, InvokeError>;
}

/// reqwest-backed transport bound to a plan's base URL and authentication.
///
/// The underlying `reqwest::Client` keeps its own connection pool, so one
/// `HttpTransport` behind an `Arc` serves every worker of every step.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    authorization: Option<HeaderValue>,
}

impl HttpTransport {
    /// Create a transport for `base_url` joined with `base_path`.
    ///
    /// # Example
    /// ```
    /// use rust_loadplan::plan::Auth;
    /// use rust_loadplan::transport::HttpTransport;
    ///
    /// let transport = HttpTransport::new(
    ///     reqwest::Client::new(),
    ///     "https://api.example.com",
    ///     "/v1/",
    ///     &Auth::None,
    /// )
    /// .unwrap();
    /// assert_eq!(transport.base_url().as_str(), "https://api.example.com/v1/");
    /// ```
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        base_path: &str,
        auth: &Auth,
    ) -> Result<Self, InvokeError> {
        let base = parse_url(base_url)?;
        let base_url = if base_path.is_empty() {
            base
        } else {
            base.join(base_path)
                .map_err(|e| InvokeError::InvalidUrl(format!("{} + {}: {}", base_url, base_path, e)))?
        };

        let authorization = auth
            .authorization_header()
            .map(|value| {
                HeaderValue::from_str(&value).map(|mut header| {
                    header.set_sensitive(true);
                    header
                })
            })
            .transpose()
            .map_err(|e| InvokeError::InvalidHeader(format!("Authorization: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            authorization,
        })
    }

    /// Create a transport from a plan's base URL, base path and auth.
    pub fn for_plan(client: reqwest::Client, plan: &Plan) -> Result<Self, InvokeError> {
        Self::new(client, &plan.base_url, &plan.base_path, &plan.auth)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve the final URL of a call.
    ///
    /// The path is resolved as a URL reference: an absolute path (`/users`)
    /// replaces the base path, a relative one (`users`) is appended to it.
    pub fn resolve_url(&self, call: &HttpCall) -> Result<Url, InvokeError> {
        let base = match &call.base_url {
            Some(url) => parse_url(url)?,
            None => self.base_url.clone(),
        };
        if call.path.is_empty() {
            return Ok(base);
        }
        base.join(&call.path)
            .map_err(|e| InvokeError::InvalidUrl(format!("{}: {}", call.path, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, call: HttpCall) -> Result<HttpResponse, InvokeError> {
        let url = self.resolve_url(&call)?;

        debug!(method = %call.method, url = %url, "Making HTTP request");

        let mut builder = self.client.request(call.method, url);
        if let Some(ref authorization) = self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        if !call.body.is_empty() {
            builder = builder.json(&call.body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| InvokeError::Transport(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            body: decode_body(status, &bytes)?,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, InvokeError> {
    Url::parse(raw).map_err(|e| InvokeError::InvalidUrl(format!("{}: {}", raw, e)))
}

/// Decode a response body into a JSON object.
///
/// Empty and `204` bodies carry no fields. Success responses must be valid
/// JSON; error responses with a non-JSON body are tolerated since the status
/// check fails them anyway.
pub fn decode_body(status: StatusCode, bytes: &[u8]) -> Result<Option<Map<String, Value>>, InvokeError> {
    if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(fields)) => Ok(Some(fields)),
        Ok(_) => Ok(None),
        Err(e) if status.is_success() => Err(InvokeError::Transport(format!(
            "invalid JSON response: {}",
            e
        ))),
        Err(_) => Ok(None),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn call(base_url: Option<&str>, path: &str) -> HttpCall {
        HttpCall {
            method: Method::GET,
            base_url: base_url.map(str::to_string),
            path: path.to_string(),
            body: Map::new(),
        }
    }

    fn transport(base: &str, path: &str) -> HttpTransport {
        HttpTransport::new(reqwest::Client::new(), base, path, &Auth::None).unwrap()
    }

    #[test]
    fn test_base_path_is_joined() {
        let t = transport("http://localhost:8080", "/api/");
        assert_eq!(t.base_url().as_str(), "http://localhost:8080/api/");
    }

    #[test]
    fn test_relative_path_appends_to_base_path() {
        let t = transport("http://localhost:8080", "/api/");
        let url = t.resolve_url(&call(None, "users/42")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/users/42");
    }

    #[test]
    fn test_absolute_path_replaces_base_path() {
        let t = transport("http://localhost:8080", "/api/");
        let url = t.resolve_url(&call(None, "/users/42")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/users/42");
    }

    #[test]
    fn test_request_base_url_overrides_plan() {
        let t = transport("http://localhost:8080", "/api/");
        let url = t
            .resolve_url(&call(Some("http://other:9000"), "/status"))
            .unwrap();
        assert_eq!(url.as_str(), "http://other:9000/status");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpTransport::new(reqwest::Client::new(), "not a url", "", &Auth::None)
            .err()
            .unwrap();
        assert!(matches!(err, InvokeError::InvalidUrl(_)));
    }

    #[test]
    fn test_decode_object_body() {
        let body = decode_body(StatusCode::OK, br#"{"id": 7}"#).unwrap().unwrap();
        assert_eq!(body.get("id"), Some(&Value::from(7)));
    }

    #[test]
    fn test_decode_empty_and_no_content() {
        assert_eq!(decode_body(StatusCode::OK, b"").unwrap(), None);
        assert_eq!(decode_body(StatusCode::OK, b"  \n").unwrap(), None);
        assert_eq!(decode_body(StatusCode::NO_CONTENT, b"garbage").unwrap(), None);
    }

    #[test]
    fn test_decode_non_object_json() {
        assert_eq!(decode_body(StatusCode::OK, b"[1, 2]").unwrap(), None);
    }

    #[test]
    fn test_decode_invalid_json_on_success_fails() {
        let err = decode_body(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, InvokeError::Transport(_)));
    }

    #[test]
    fn test_decode_invalid_json_on_error_status_is_ignored() {
        assert_eq!(
            decode_body(StatusCode::INTERNAL_SERVER_ERROR, b"<html>").unwrap(),
            None
        );
    }
}
