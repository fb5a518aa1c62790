use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::utils::parse_headers_with_escapes;

/// Connection pool settings applied to the shared client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum idle connections to keep per host
    pub max_idle_per_host: usize,

    /// How long idle connections stay in the pool before cleanup
    pub idle_timeout: Duration,

    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl PoolConfig {
    fn apply_to_builder(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        builder
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout)
            .tcp_keepalive(self.tcp_keepalive)
    }
}

/// Configuration for building the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub skip_tls_verify: bool,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub custom_headers: Option<String>,
    pub pool_config: PoolConfig,

    /// Per-request timeout; `None` lets a call wait indefinitely
    pub request_timeout: Option<Duration>,
}

/// Result of building the client, includes parsed headers for logging.
pub struct ClientBuildResult {
    pub client: reqwest::Client,
    pub parsed_headers: HeaderMap,
}

/// Builds the reqwest client shared by every user of a run.
pub fn build_client(
    config: &ClientConfig,
) -> Result<ClientBuildResult, Box<dyn std::error::Error + Send + Sync>> {
    let mut builder = config
        .pool_config
        .apply_to_builder(reqwest::Client::builder());

    builder = configure_mtls(
        builder,
        config.client_cert_path.as_deref(),
        config.client_key_path.as_deref(),
    )?;

    let parsed_headers = configure_custom_headers(config.custom_headers.as_deref())?;
    if !parsed_headers.is_empty() {
        builder = builder.default_headers(parsed_headers.clone());
        info!(count = parsed_headers.len(), "Configured custom default headers");
    }

    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }

    if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        builder = builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    Ok(ClientBuildResult {
        client: builder.build()?,
        parsed_headers,
    })
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("Failed to read {} file '{}': {}", what, path, e))
}

fn configure_mtls(
    builder: reqwest::ClientBuilder,
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> Result<reqwest::ClientBuilder, Box<dyn std::error::Error + Send + Sync>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (Some(cert), Some(key)) => (cert, key),
        (Some(_), None) => {
            return Err("CLIENT_CERT_PATH is set, but CLIENT_KEY_PATH is missing for mTLS.".into())
        }
        (None, Some(_)) => {
            return Err("CLIENT_KEY_PATH is set, but CLIENT_CERT_PATH is missing for mTLS.".into())
        }
        (None, None) => return Ok(builder),
    };

    let cert_pem = read_pem(cert_path, "client certificate")?;
    let key_pem = read_pem(key_path, "client key")?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to parse PEM certificates from '{}': {}", cert_path, e))?;
    if certs.is_empty() {
        return Err(format!("No PEM certificates found in '{}'", cert_path).into());
    }

    let keys = rustls_pemfile::pkcs8_private_keys(&mut key_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Failed to parse PKCS#8 private key from '{}': {}", key_path, e))?;
    if keys.is_empty() {
        return Err(format!("No PKCS#8 private keys found in '{}'", key_path).into());
    }

    let mut identity_pem = cert_pem;
    if !identity_pem.ends_with(b"\n") {
        identity_pem.push(b'\n');
    }
    identity_pem.extend_from_slice(&key_pem);

    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| format!("Failed to build client identity from PEM: {}", e))?;

    info!(cert = %cert_path, key = %key_path, "Configured mTLS client identity");
    Ok(builder.identity(identity))
}

fn configure_custom_headers(
    custom_headers: Option<&str>,
) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
    let mut headers = HeaderMap::new();
    let Some(raw) = custom_headers.filter(|s| !s.trim().is_empty()) else {
        return Ok(headers);
    };

    for entry in parse_headers_with_escapes(raw) {
        let entry = entry.trim();
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| format!("Invalid header '{}'. Expected 'Name:Value'.", entry))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("Header name cannot be empty in '{}'.", entry).into());
        }

        let header_name = HeaderName::from_str(name)
            .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|e| format!("Invalid header value for '{}': {}", name, e))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}
