//! Telemetry logic.
//! Support logging, OLTP log export and authentication metrics.

use opentelemetry::KeyValue;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::{LogError, SdkLoggerProvider};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{DirectoryError, Error};

const SERVICE_NAME: &str = "autha-ldap";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_FILTER: &str = "info";

fn ressources() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attribute(KeyValue::new("service.version", VERSION))
        .build()
}

/// Create OLTP exporter for logs.
pub fn setup_logging(endpoint: &str) -> Result<SdkLoggerProvider, LogError> {
    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_resource(ressources())
        .with_batch_exporter(exporter)
        .build())
}

/// Install the global `tracing` subscriber.
///
/// Logs go to stdout, filtered by `RUST_LOG`, and to `otlp_endpoint` when
/// set. The returned provider must be shut down before exit to flush logs.
pub fn init(
    otlp_endpoint: Option<&str>,
) -> Result<Option<SdkLoggerProvider>, LogError> {
    let provider = otlp_endpoint.map(setup_logging).transpose()?;
    let bridge = provider
        .as_ref()
        .map(|provider| OpenTelemetryTracingBridge::new(provider));

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(bridge)
        .init();

    Ok(provider)
}

/// Diagnostics sink given to the engine at construction.
pub trait Telemetry: Send + Sync {
    /// A directory could not be searched.
    fn record_directory_failure(
        &self,
        directory: &str,
        error: &DirectoryError,
    );

    /// A directory was searched.
    fn record_search(&self, directory: &str, found: bool);

    /// Credentials were verified.
    fn record_login_success(&self, username: &str, provider: &str);

    /// Credentials could not be verified.
    fn record_login_failure(&self, username: &str, error: &Error);

    /// A lookup failed and its error was swallowed.
    fn record_lookup_failure(&self, username: &str, error: &Error);
}

/// Tracing-based telemetry, also feeding `metrics` counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    /// Create a new [`TracingTelemetry`].
    pub fn new() -> Self {
        Self
    }
}

impl Telemetry for TracingTelemetry {
    fn record_directory_failure(
        &self,
        directory: &str,
        error: &DirectoryError,
    ) {
        tracing::warn!(%directory, %error, "directory cannot be searched");
        metrics::counter!(
            "ldap_search_total",
            "directory" => directory.to_owned(),
            "outcome" => "error"
        )
        .increment(1);
    }

    fn record_search(&self, directory: &str, found: bool) {
        tracing::debug!(%directory, found, "directory searched");
        metrics::counter!(
            "ldap_search_total",
            "directory" => directory.to_owned(),
            "outcome" => if found { "found" } else { "not_found" }
        )
        .increment(1);
    }

    fn record_login_success(&self, username: &str, provider: &str) {
        tracing::info!(%username, %provider, "authentication successful");
        metrics::counter!("ldap_login_total", "outcome" => "success")
            .increment(1);
    }

    fn record_login_failure(&self, username: &str, error: &Error) {
        let reason = error
            .login_failure()
            .map_or("unexpected", |failure| failure.reason());

        match error {
            Error::LoginFailed(_) => {
                tracing::info!(
                    %username,
                    reason,
                    %error,
                    "authentication failed"
                )
            },
            _ => {
                tracing::error!(%username, %error, "authentication errored")
            },
        }

        metrics::counter!(
            "ldap_login_total",
            "outcome" => "failure",
            "reason" => reason
        )
        .increment(1);
    }

    fn record_lookup_failure(&self, username: &str, error: &Error) {
        tracing::trace!(%username, ?error, "user lookup failed");
        metrics::counter!("ldap_lookup_failures_total").increment(1);
    }
}
