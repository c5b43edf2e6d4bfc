//! Tracing and OpenTelemetry setup for the agent process.
//!
//! Call [`init_tracing`] once at startup and hold the returned guard until
//! exit.  Verbosity, output format and the OTLP endpoint come from
//! [`LogSettings`], which the binary fills from its configuration.
//! `RUST_LOG`, when set, still takes precedence over the verbosity flag.
//!
//! # Example
//!
//! ```rust,no_run
//! use wayfarer_runtime::telemetry::{LogSettings, init_tracing};
//!
//! let _guard = init_tracing("wayfarer", &LogSettings::default());
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// `debug` instead of `info` when `RUST_LOG` is unset.
    pub verbose: bool,
    /// Newline-delimited JSON instead of the compact formatter.
    pub json: bool,
    /// OTLP/HTTP collector base URL, e.g. `http://localhost:4318`.
    pub otlp_endpoint: Option<String>,
}

impl LogSettings {
    fn default_directive(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

/// Install the global `tracing` subscriber.
///
/// With an OTLP endpoint configured, spans are also exported to the
/// collector.  Without one, or if the exporter cannot be built, only the
/// console formatter is installed.
pub fn init_tracing(service_name: &str, settings: &LogSettings) -> TracerProviderGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.default_directive()));

    let provider = build_provider(service_name, settings.otlp_endpoint.as_deref());

    if let Some(ref p) = provider {
        let tracer = p.tracer("wayfarer");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        if settings.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
    } else if settings.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the tracer provider down, flushing pending spans, when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[wayfarer] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_provider(service_name: &str, endpoint: Option<&str>) -> Option<SdkTracerProvider> {
    let endpoint = endpoint.filter(|e| !e.trim().is_empty())?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[wayfarer] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Synchronous export: no Tokio task may be spawned before the
            // subscriber exists.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_means_no_provider() {
        assert!(build_provider("test", None).is_none());
        assert!(build_provider("test", Some("  ")).is_none());
    }

    #[test]
    fn verbose_switches_default_directive() {
        let quiet = LogSettings::default();
        let loud = LogSettings { verbose: true, ..LogSettings::default() };
        assert_eq!(quiet.default_directive(), "info");
        assert_eq!(loud.default_directive(), "debug");
    }

    #[test]
    fn guard_without_provider_drops_cleanly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
