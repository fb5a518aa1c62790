use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rust_loadplan::client::build_client;
use rust_loadplan::config::{Config, LogFormat};
use rust_loadplan::loader::load_plan;
use rust_loadplan::report::StdoutReporter;
use rust_loadplan::runner::run;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Required environment variables:");
    eprintln!("  PLAN_DIR                - Directory holding requests/, tasks/, steps/ and the plan file");
    eprintln!();
    eprintln!("Optional environment variables:");
    eprintln!("  PLAN_FILE               - Plan file name inside PLAN_DIR (default: plan.json)");
    eprintln!("  REQUEST_TIMEOUT         - Per-request timeout: 30s, 10m, 2h, 1d (default: none)");
    eprintln!("  LOG_FORMAT              - Diagnostic log format: text or json (default: text)");
    eprintln!("  RUST_LOG                - Log filter directive (default: info)");
    eprintln!();
    eprintln!("TLS/mTLS configuration:");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  CLIENT_CERT_PATH        - Path to client certificate for mTLS");
    eprintln!("  CLIENT_KEY_PATH         - Path to client key for mTLS");
    eprintln!("  Note: Both CLIENT_CERT_PATH and CLIENT_KEY_PATH must be set together");
    eprintln!();
    eprintln!("Advanced configuration:");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated headers (use \\, for literal commas)");
    eprintln!("  POOL_MAX_IDLE_PER_HOST  - Idle connections kept per host (default: 32)");
    eprintln!("  POOL_IDLE_TIMEOUT       - Idle connection lifetime (default: 90s)");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    config.log_summary();

    let loaded = match load_plan(&config.plan_dir, &config.plan_file) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "Failed to load plan definitions");
            std::process::exit(1);
        }
    };
    info!(
        requests = loaded.requests.len(),
        tasks = loaded.tasks.len(),
        steps = loaded.steps.len(),
        "Loaded plan definitions"
    );

    let client_result = match build_client(&config.to_client_config()) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let summary = match run(&loaded.plan, client_result.client, Arc::new(StdoutReporter)).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Failed to configure transport");
            std::process::exit(1);
        }
    };

    let failed: usize = summary.steps.iter().map(|s| s.failed_iterations).sum();
    info!(
        plan = %summary.plan_name,
        steps = summary.steps.len(),
        failed_iterations = failed,
        "Run finished"
    );
}
