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

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use snafu::Whatever;

mod build_info;
use zipweather_app::{AppConfig, ServiceKind};
use zipweather_common_telemetry::logging::{LogFormat, LoggingOptions, OtlpExportProtocol};
use zipweather_server::{
    gateway::{DEFAULT_RESOLVER_URL, GatewayConfig},
    http::RestServerConfig,
    resolver::{ResolverConfig, postal::DEFAULT_POSTAL_URL, weather::DEFAULT_WEATHER_URL},
};

#[derive(Debug, Parser)]
#[clap(
name = "zipweather",
about = "Postal code to current temperature, over two traced HTTP services",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION,
long_version = build_info::LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Gateway(GatewayArgs),
    Resolver(ResolverArgs),
}

/// Settings shared by both services.
#[derive(Debug, Clone, Args)]
struct CommonArgs {
    /// Address to listen on
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    http_host: String,

    /// Port to listen on [default: 8080 for the gateway, 8081 for the
    /// resolver]
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Service name on logs and exported spans
    #[arg(long, env = "OTEL_SERVICE_NAME")]
    service_name: Option<String>,

    /// OTLP collector endpoint; span export is off when unset
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// OTLP transport, `grpc` or `http`
    #[arg(long, env = "OTEL_EXPORTER_OTLP_PROTOCOL", default_value = "grpc")]
    otlp_protocol: OtlpExportProtocol,

    /// Fraction of new traces to sample, between 0 and 1
    #[arg(long, env = "OTEL_TRACES_SAMPLER_ARG", value_parser = parse_ratio)]
    sample_ratio: Option<f64>,

    /// Log filter, e.g. `info,hyper=warn` [default: RUST_LOG, then info]
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format, `text` or `json`
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Also write rotated log files into this directory
    #[arg(long, env = "LOG_DIR", default_value = "")]
    log_dir: String,

    /// Seconds in-flight requests may take after a shutdown signal
    #[arg(long, env = "SHUTDOWN_GRACE_PERIOD_SECS", default_value_t = 30)]
    grace_period_secs: u64,

    /// Timeout in seconds for each upstream call
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 5)]
    upstream_timeout_secs: u64,
}

fn parse_ratio(value: &str) -> Result<f64, String> {
    let ratio: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("`{value}` is outside 0..=1"))
    }
}

impl CommonArgs {
    fn upstream_timeout(&self) -> Duration { Duration::from_secs(self.upstream_timeout_secs) }

    fn bind_address(&self, default_port: u16) -> String {
        let port = self.http_port.unwrap_or(default_port);
        if self.http_host.contains(':') {
            format!("[{}]:{port}", self.http_host)
        } else {
            format!("{}:{port}", self.http_host)
        }
    }

    fn app_config(&self, service: ServiceKind, default_port: u16, default_name: &str) -> AppConfig {
        let logging = LoggingOptions {
            dir: self.log_dir.clone(),
            level: self.log_level.clone(),
            log_format: self.log_format,
            enable_otlp_tracing: self.otlp_endpoint.is_some(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            tracing_sample_ratio: self.sample_ratio,
            otlp_export_protocol: Some(self.otlp_protocol.clone()),
            ..LoggingOptions::default()
        };

        AppConfig::builder()
            .service_name(
                self.service_name
                    .clone()
                    .unwrap_or_else(|| default_name.to_string()),
            )
            .service(service)
            .http_config(
                RestServerConfig::builder()
                    .bind_address(self.bind_address(default_port))
                    .build(),
            )
            .logging(logging)
            .grace_period(Duration::from_secs(self.grace_period_secs))
            .build()
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the gateway: accepts POST /city-by-zipcode with {'cep': '<8 digits>'}
and asks the resolver for the weather.
Examples:

zipweather gateway --resolver-url http://localhost:8081

")]
struct GatewayArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Base URL of the resolver service
    #[arg(long, env = "EXTERNAL_CALL_URL", default_value = DEFAULT_RESOLVER_URL)]
    resolver_url: String,
}

impl GatewayArgs {
    fn app_config(&self) -> AppConfig {
        let service = ServiceKind::Gateway(
            GatewayConfig::builder()
                .resolver_url(self.resolver_url.clone())
                .upstream_timeout(self.common.upstream_timeout())
                .build(),
        );
        self.common.app_config(service, 8080, "zipweather-gateway")
    }

    async fn run(&self) -> Result<(), Whatever> { self.app_config().open().run().await }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the resolver: serves GET /city-weather?zipcode=<8 digits> by looking
the city up on ViaCEP and its temperature on WeatherAPI.
Examples:

WEATHER_API_KEY=... zipweather resolver

")]
struct ResolverArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Base URL of the postal lookup API
    #[arg(long, env = "VIACEP_URL", default_value = DEFAULT_POSTAL_URL)]
    viacep_url: String,

    /// Base URL of the weather API
    #[arg(long, env = "WEATHER_API_URL", default_value = DEFAULT_WEATHER_URL)]
    weather_url: String,

    /// WeatherAPI key
    #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
    weather_api_key: String,
}

impl ResolverArgs {
    fn app_config(&self) -> AppConfig {
        let service = ServiceKind::Resolver(
            ResolverConfig::builder()
                .postal_url(self.viacep_url.clone())
                .weather_url(self.weather_url.clone())
                .weather_api_key(self.weather_api_key.clone())
                .upstream_timeout(self.common.upstream_timeout())
                .build(),
        );
        self.common.app_config(service, 8081, "zipweather-resolver")
    }

    async fn run(&self) -> Result<(), Whatever> { self.app_config().open().run().await }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.commands {
        Commands::Gateway(args) => args.run().await,
        Commands::Resolver(args) => args.run().await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() { Cli::command().debug_assert(); }

    #[test]
    fn test_gateway_flags() {
        let cli = Cli::try_parse_from([
            "zipweather",
            "gateway",
            "--http-port",
            "9090",
            "--resolver-url",
            "http://resolver:8081",
            "--otlp-endpoint",
            "http://collector:4317",
            "--sample-ratio",
            "0.25",
        ])
        .unwrap();
        let Commands::Gateway(args) = cli.commands else {
            panic!("expected the gateway subcommand");
        };

        let config = args.app_config();
        assert_eq!(config.http_config.bind_address, "0.0.0.0:9090");
        assert!(config.logging.enable_otlp_tracing);
        assert_eq!(config.logging.tracing_sample_ratio, Some(0.25));
        assert_eq!(config.grace_period, Duration::from_secs(30));
        let ServiceKind::Gateway(gateway) = config.service else {
            panic!("expected a gateway config");
        };
        assert_eq!(gateway.resolver_url, "http://resolver:8081");
        assert_eq!(gateway.upstream_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_resolver_flags() {
        let cli = Cli::try_parse_from([
            "zipweather",
            "resolver",
            "--http-host",
            "::",
            "--weather-api-key",
            "abc",
        ])
        .unwrap();
        let Commands::Resolver(args) = cli.commands else {
            panic!("expected the resolver subcommand");
        };

        let config = args.app_config();
        assert_eq!(config.http_config.bind_address, "[::]:8081");
        let ServiceKind::Resolver(resolver) = config.service else {
            panic!("expected a resolver config");
        };
        assert_eq!(resolver.weather_api_key, "abc");
    }

    #[test]
    fn test_sample_ratio_bounds() {
        assert!(parse_ratio("1").is_ok());
        assert!(parse_ratio("1.5").is_err());
        assert!(parse_ratio("half").is_err());
    }
}
