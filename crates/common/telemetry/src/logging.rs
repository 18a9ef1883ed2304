// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::HashMap,
    env,
    io::IsTerminal,
    str::FromStr,
    sync::{Mutex, Once, PoisonError},
};

use bon::Builder;
use once_cell::sync::Lazy;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::resource;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, filter, layer::SubscriberExt, prelude::*};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// Configuration sources often carry `LOG_FORMAT=` as an empty string; that
/// should behave like an unset value rather than a parse error.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default OTLP endpoint when using gRPC exporter protocol.
pub const DEFAULT_OTLP_GRPC_ENDPOINT: &str = "http://localhost:4317";

/// The default OTLP endpoint when using HTTP exporter protocol.
pub const DEFAULT_OTLP_HTTP_ENDPOINT: &str = "http://localhost:4318/v1/traces";

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Configuration options for the logging system.
///
/// Covers output destinations, formats and the OpenTelemetry export
/// pipeline. Every field has a default so a service can start with nothing
/// configured and only stdout text logging enabled.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory path for storing log files.
    ///
    /// When non-empty, log files are written here with hourly rotation,
    /// alongside an error-only file. Empty means stdout only.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Log level filter string, e.g. `"info,hyper=warn"`.
    ///
    /// Falls back to `RUST_LOG`, then to `info`.
    pub level: Option<String>,

    /// Output format for log messages.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to output logs to stdout in addition to files.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,

    /// Export spans to an OTLP collector.
    #[default = false]
    #[builder(default)]
    pub enable_otlp_tracing: bool,

    /// Collector endpoint. URLs without a scheme get `http://` prepended.
    pub otlp_endpoint: Option<String>,

    /// Fraction of new root traces to sample, in `[0.0, 1.0]`.
    ///
    /// Child spans always follow their parent's decision. `None` samples
    /// everything.
    pub tracing_sample_ratio: Option<f64>,

    /// OTLP transport protocol. Defaults to gRPC.
    pub otlp_export_protocol: Option<OtlpExportProtocol>,

    /// Custom HTTP headers for OTLP HTTP exports.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    #[default(_code = "HashMap::new()")]
    #[builder(default)]
    pub otlp_headers: HashMap<String, String>,
}

/// OpenTelemetry Protocol (OTLP) export transport protocols.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum OtlpExportProtocol {
    /// gRPC transport through tonic.
    #[display("grpc")]
    Grpc,

    /// HTTP POST with binary protobuf payloads.
    #[display("http")]
    Http,
}

impl FromStr for OtlpExportProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grpc" => Ok(Self::Grpc),
            "http" | "http/protobuf" => Ok(Self::Http),
            other => Err(format!("unsupported OTLP protocol: {other}")),
        }
    }
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with the current span and span list.
    #[display("json")]
    Json,

    /// Human-readable text.
    #[default]
    #[display("text")]
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "" | "text" => Ok(Self::Text),
            other => Err(format!("unsupported log format: {other}")),
        }
    }
}

/// Owns everything that must outlive the logging setup.
///
/// Holds the non-blocking writer guards and the tracer provider. Dropping
/// the guard (or calling [`TelemetryGuard::shutdown`]) flushes the batch span
/// processor and shuts the exporter down, then stops the log writer threads.
#[derive(Default)]
pub struct TelemetryGuard {
    provider:      Option<SdkTracerProvider>,
    exporting:     bool,
    worker_guards: Vec<WorkerGuard>,
}

impl TelemetryGuard {
    /// Whether spans are being exported to a collector.
    #[must_use]
    pub const fn is_exporting(&self) -> bool { self.exporting }

    /// Flushes pending spans and shuts the exporter down.
    ///
    /// Blocks until the batch processor has drained, so call it from a
    /// blocking context when inside an async runtime.
    pub fn shutdown(mut self) { self.close_provider(); }

    fn close_provider(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(err) = provider.force_flush() {
            tracing::warn!(error = %err, "failed to flush pending spans");
        }
        if let Err(err) = provider.shutdown() {
            tracing::warn!(error = %err, "failed to shut down tracer provider");
        } else {
            tracing::info!("tracer provider shut down");
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) { self.close_provider(); }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("exporting", &self.is_exporting())
            .field("worker_guards", &self.worker_guards.len())
            .finish()
    }
}

/// Initialize logging for unit and integration tests.
///
/// Safe to call from every test: the first call installs the subscriber and
/// parks its guard in a static, later calls do nothing.
///
/// # Environment Variables
///
/// * `UNITTEST_LOG_DIR` - Directory for test logs (unset: stdout only)
/// * `UNITTEST_LOG_LEVEL` - Log level filter (default: `"debug,hyper=warn,..."`)
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let dir = env::var("UNITTEST_LOG_DIR").unwrap_or_default();
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| {
            "debug,hyper=warn,hyper_util=warn,tower=warn,reqwest=warn,h2=info,tonic=info"
                .to_string()
        });
        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            ..Default::default()
        };
        let guard = init_global_logging("unittest", &opts, None);
        *GLOBAL_UT_LOG_GUARD
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(guard);

        tracing::info!("logs dir = {}", dir);
    });
}

/// Keeps the unit test logging guard alive for the whole test binary.
static GLOBAL_UT_LOG_GUARD: Lazy<Mutex<Option<TelemetryGuard>>> = Lazy::new(|| Mutex::new(None));

/// Default log level filter when no specific configuration is provided.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Target of the per-request server span opened by the HTTP middleware. The
/// span is created at TRACE level and carries the remote parent, so it must
/// pass the filter whatever the configured level.
const OTEL_MIDDLEWARE_TARGET: &str = "otel::tracing";

/// Initialize logging, trace-context propagation and, optionally, OTLP span
/// export.
///
/// Sets up the stdout layer, hourly rotated file layers when `opts.dir` is
/// set, and a `tracing-opentelemetry` layer. The layer and the W3C
/// propagator are installed in every case, so incoming `traceparent`
/// headers are honoured and forwarded. Spans only leave the process when
/// `opts.enable_otlp_tracing` is true; the provider then gets a batching
/// OTLP exporter.
///
/// Only the first call in a process has an effect; later calls return an
/// empty guard.
///
/// # Panics
///
/// Panics when the log directory cannot be created, the level string does
/// not parse, or the OTLP exporter cannot be built. These are startup
/// misconfigurations.
pub fn init_global_logging(
    app_name: &str,
    opts: &LoggingOptions,
    node_id: Option<String>,
) -> TelemetryGuard {
    static START: Once = Once::new();
    let mut telemetry = TelemetryGuard::default();

    START.call_once(|| {
        // Another logger may already own the `log` facade.
        let _ = LogTracer::init();

        let stdout_logging_layer = if opts.append_stdout {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            telemetry.worker_guards.push(guard);

            if opts.log_format == LogFormat::Json {
                Some(
                    tracing_subscriber::fmt::Layer::new()
                        .json()
                        .with_writer(writer)
                        .with_ansi(std::io::stdout().is_terminal())
                        .with_current_span(true)
                        .with_span_list(true)
                        .boxed(),
                )
            } else {
                Some(
                    tracing_subscriber::fmt::Layer::new()
                        .with_writer(writer)
                        .with_ansi(std::io::stdout().is_terminal())
                        .boxed(),
                )
            }
        } else {
            None
        };

        let file_logging_layer = if opts.dir.is_empty() {
            None
        } else {
            let rolling_appender = RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_prefix(app_name)
                .max_log_files(opts.max_log_files)
                .build(&opts.dir)
                .unwrap_or_else(|e| {
                    panic!(
                        "initializing rolling file appender at {} failed: {}",
                        &opts.dir, e
                    )
                });
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender);
            telemetry.worker_guards.push(guard);

            if opts.log_format == LogFormat::Json {
                Some(
                    tracing_subscriber::fmt::Layer::new()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_current_span(true)
                        .with_span_list(true)
                        .boxed(),
                )
            } else {
                Some(
                    tracing_subscriber::fmt::Layer::new()
                        .with_writer(writer)
                        .with_ansi(false)
                        .boxed(),
                )
            }
        };

        let err_file_logging_layer = if opts.dir.is_empty() {
            None
        } else {
            let rolling_appender = RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_prefix(format!("{app_name}-err"))
                .max_log_files(opts.max_log_files)
                .build(&opts.dir)
                .unwrap_or_else(|e| {
                    panic!(
                        "initializing rolling file appender at {} failed: {}",
                        &opts.dir, e
                    )
                });
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender);
            telemetry.worker_guards.push(guard);

            Some(
                tracing_subscriber::fmt::Layer::new()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(filter::LevelFilter::ERROR)
                    .boxed(),
            )
        };

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string")
            .with_target(OTEL_MIDDLEWARE_TARGET, Level::TRACE);

        global::set_text_map_propagator(TraceContextPropagator::new());

        let provider = build_tracer_provider(app_name, opts, node_id);
        global::set_tracer_provider(provider.clone());
        let tracer = provider.tracer("zipweather");
        telemetry.exporting = opts.enable_otlp_tracing;
        telemetry.provider = Some(provider);

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_logging_layer)
            .with(file_logging_layer)
            .with(err_file_logging_layer)
            .with(tracing_opentelemetry::layer().with_tracer(tracer));
        install_subscriber(subscriber);
    });

    telemetry
}

#[allow(clippy::print_stderr)]
fn install_subscriber<S>(subscriber: S)
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("global tracing subscriber already set: {err}");
    }
}

/// Builds the tracer provider behind the `tracing-opentelemetry` layer.
///
/// Without OTLP export the provider has no processor: spans still get ids
/// and parents, which is all propagation needs, and are dropped on end.
fn build_tracer_provider(
    app_name: &str,
    opts: &LoggingOptions,
    node_id: Option<String>,
) -> SdkTracerProvider {
    let sampler = opts.tracing_sample_ratio.map_or(
        Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        |ratio| Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio))),
    );

    let mut builder = SdkTracerProvider::builder();
    if opts.enable_otlp_tracing {
        builder = builder.with_batch_exporter(build_otlp_exporter(opts));
    }

    builder
        .with_sampler(sampler)
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_attributes([
                    KeyValue::new(resource::SERVICE_NAME, app_name.to_string()),
                    KeyValue::new(
                        resource::SERVICE_INSTANCE_ID,
                        node_id.unwrap_or_else(|| "none".to_string()),
                    ),
                    KeyValue::new(resource::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(resource::PROCESS_PID, std::process::id().to_string()),
                ])
                .build(),
        )
        .build()
}

/// Resolves the collector endpoint for the configured protocol.
fn otlp_endpoint(opts: &LoggingOptions, protocol: &OtlpExportProtocol) -> String {
    opts.otlp_endpoint.as_ref().map_or_else(
        || match protocol {
            OtlpExportProtocol::Grpc => DEFAULT_OTLP_GRPC_ENDPOINT.to_string(),
            OtlpExportProtocol::Http => DEFAULT_OTLP_HTTP_ENDPOINT.to_string(),
        },
        |e| {
            if e.starts_with("http") {
                e.clone()
            } else {
                format!("http://{e}")
            }
        },
    )
}

/// Build an OTLP span exporter.
///
/// # Panics
///
/// Panics if the exporter cannot be created, which indicates a configuration
/// error that should be resolved before the service starts.
fn build_otlp_exporter(opts: &LoggingOptions) -> SpanExporter {
    let protocol = opts
        .otlp_export_protocol
        .clone()
        .unwrap_or(OtlpExportProtocol::Grpc);
    let endpoint = otlp_endpoint(opts, &protocol);

    match protocol {
        OtlpExportProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .expect("Failed to create OTLP gRPC exporter"),

        OtlpExportProtocol::Http => SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .with_protocol(Protocol::HttpBinary)
            .with_headers(opts.otlp_headers.clone())
            .build()
            .expect("Failed to create OTLP HTTP exporter"),
    }
}
