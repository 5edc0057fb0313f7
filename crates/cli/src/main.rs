//! Gateway CLI entry point.
//!
//! This binary is the composition root for the gateway. Responsibilities:
//!
//! 1. **Parse configuration** — load the gateway TOML file and validate it.
//! 2. **Wire observability** — configure `tracing-subscriber` with an
//!    env-filter layer (plain or JSON output). All `tracing` spans and
//!    structured events emitted by every crate in the workspace flow
//!    through this layer.
//! 3. **Construct infrastructure** — build the policy tables, both limiter
//!    partitions, the static credential resolver, and the HTTP upstream
//!    adapter, and inject them into [`admission::AdmissionPipeline`].
//! 4. **Dispatch** — run one request through the pipeline and print the
//!    response contract JSON.
//!
//! Exit codes: `0` on an admitted request, `1` on any pipeline rejection,
//! `2` on configuration or invocation errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};

use admission::{
    AdmissionPipeline, AdmissionRequest, Credential, FixedWindowLimiter, GatewayConfig,
    LimiterScope, OperationName, PlanCapabilityTable, PolicyTables, ResourceId,
    StaticCredentialResolver, UpstreamInvoker,
};
use upstream::HttpUpstreamClient;

#[derive(Debug, Parser)]
#[command(
    name = "gateway",
    about = "Run one operation request through the admission pipeline."
)]
struct Args {
    /// Path to the gateway configuration file.
    #[arg(long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Operation to request (must be registered in the configuration).
    #[arg(long)]
    operation: String,

    /// Inline JSON payload. Defaults to an empty object.
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,

    /// Read the JSON payload from a file instead.
    #[arg(long)]
    payload_file: Option<PathBuf>,

    /// Bearer credential. Falls back to the GATEWAY_TOKEN environment variable.
    #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true)]
    credential: Option<String>,

    /// Explicit opt-in for destructive operations.
    #[arg(long)]
    confirm: bool,

    /// Emit log events as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.json_logs);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    let text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading configuration from {}", args.config.display()))?;
    let config: GatewayConfig = toml::from_str(&text).context("parsing configuration")?;

    let pipeline = build_pipeline(config)?;
    let request = build_request(&args)?;

    let outcome = pipeline.handle(request).await;
    tracing::info!(
        request_id = %outcome.decision.request_id,
        outcome = ?outcome.decision.outcome,
        "admission decision recorded"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome.response).context("serialising response")?
    );
    Ok(outcome.response.ok)
}

/// Configures the workspace-wide tracing subscriber.
///
/// The filter defaults to `info` and honours `RUST_LOG`. Logs go to stderr
/// so stdout stays reserved for the response contract JSON.
fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wires the pipeline from validated configuration.
fn build_pipeline(config: GatewayConfig) -> Result<AdmissionPipeline> {
    config.validate()?;

    let plans = PlanCapabilityTable::new(config.plans)?;
    let policy = PolicyTables::new(config.operations, plans)?;
    let resolver = StaticCredentialResolver::new(
        config
            .principals
            .into_iter()
            .map(admission::PrincipalConfig::into_entry),
    );

    let resource_limiter = Arc::new(FixedWindowLimiter::new(
        LimiterScope::Resource,
        config.limits.resource.max_requests,
        config.limits.resource.window(),
    ));
    let credential_limiter = Arc::new(FixedWindowLimiter::new(
        LimiterScope::Credential,
        config.limits.credential.max_requests,
        config.limits.credential.window(),
    ));

    let client = HttpUpstreamClient::new(config.upstream.base_url.as_str());
    let invoker = UpstreamInvoker::new(Arc::new(client), config.invoker.policy());
    let resource = ResourceId::new(config.upstream.base_url.as_str())
        .context("upstream.base_url must not be empty")?;

    Ok(AdmissionPipeline::new(
        Arc::new(resolver),
        Arc::new(policy),
        resource_limiter,
        credential_limiter,
        invoker,
        resource,
    ))
}

/// Assembles the admission request from CLI arguments.
fn build_request(args: &Args) -> Result<AdmissionRequest> {
    let payload: Value = match (&args.payload, &args.payload_file) {
        (Some(inline), _) => serde_json::from_str(inline).context("payload is not valid JSON")?,
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading payload from {}", path.display()))?;
            serde_json::from_str(&text).context("payload file is not valid JSON")?
        }
        (None, None) => json!({}),
    };

    let operation = OperationName::new(args.operation.as_str())
        .context("operation name must not be empty")?;
    let credential = args.credential.as_deref().and_then(Credential::new);

    Ok(AdmissionRequest {
        operation,
        payload,
        credential,
        confirmed: args.confirm,
    })
}
