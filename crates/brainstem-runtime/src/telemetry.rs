//! Logging and trace export bootstrap.
//!
//! [`init_tracing`] installs the global subscriber once at process start:
//! an [`EnvFilter`] (from `RUST_LOG`, default `info`), a compact or JSON
//! formatter, and, when an OTLP endpoint is configured, an OpenTelemetry
//! span exporter so the per-cycle spans reach a collector.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter. |
//! | `BRAINSTEM_LOG_FORMAT=json` | Newline-delimited JSON output. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL. |

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the console layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// `"json"` (any case) selects JSON; anything else is compact.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub service_name: String,
    pub format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl TelemetrySettings {
    /// Settings for `service_name` taken from the environment only.
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            format: LogFormat::default(),
            otlp_endpoint: None,
        }
        .with_env_overrides()
    }

    /// Let `BRAINSTEM_LOG_FORMAT` and `OTEL_EXPORTER_OTLP_ENDPOINT` win over
    /// whatever is already set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("BRAINSTEM_LOG_FORMAT") {
            self.format = LogFormat::parse(&raw);
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            self.otlp_endpoint = Some(endpoint);
        }
        self
    }
}

/// Flushes and shuts down the span exporter when dropped.  Keep it alive in
/// `main` for the life of the process.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// `true` when spans are being exported.
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[brainstem] trace exporter shutdown failed: {e}");
        }
    }
}

/// Install the global subscriber.  A second call leaves the first
/// subscriber in place.
pub fn init_tracing(settings: &TelemetrySettings) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = settings
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| span_provider(&settings.service_name, endpoint));

    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("brainstem")));
    let (json, compact) = match settings.format {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Compact => (None, Some(fmt::layer().compact())),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(compact)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[brainstem] tracing subscriber already installed: {e}");
    }

    TelemetryGuard { provider }
}

/// OTLP/HTTP span pipeline.  Uses the simple exporter: the tokio runtime is
/// built after this runs, so no batch task can be spawned yet.
fn span_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[brainstem] OTLP exporter unavailable: {e}");
            return None;
        }
    };

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Compact);
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    }

    #[test]
    fn env_overrides_apply() {
        // SAFETY: this is the only test in the crate touching these vars.
        unsafe {
            std::env::set_var("BRAINSTEM_LOG_FORMAT", "json");
            std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT");
        }
        let settings = TelemetrySettings::from_env("brainstem-test");
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.otlp_endpoint, None);
        assert_eq!(settings.service_name, "brainstem-test");
        unsafe { std::env::remove_var("BRAINSTEM_LOG_FORMAT") };
    }

    #[test]
    fn guard_without_exporter_drops_cleanly() {
        let guard = TelemetryGuard { provider: None };
        assert!(!guard.exporting());
        drop(guard);
    }

    #[test]
    fn init_without_endpoint_does_not_export() {
        let settings = TelemetrySettings {
            service_name: "brainstem-test".into(),
            format: LogFormat::Compact,
            otlp_endpoint: None,
        };
        let guard = init_tracing(&settings);
        assert!(!guard.exporting());
    }
}
