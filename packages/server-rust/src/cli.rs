//! Command-line interface for the `restkit` binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::logging::LogFormat;
use crate::network::NetworkConfig;
use crate::service::{ApiToken, PagingConfig, ServiceConfig, ThrottleConfig};

/// Serves CRUD and transition routes for the resources declared in a manifest.
#[derive(Parser, Debug)]
#[command(name = "restkit", version)]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "RESTKIT_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on. 0 picks a free port.
    #[arg(long, env = "RESTKIT_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Path prefix the resource routes are mounted under.
    #[arg(long, env = "RESTKIT_MOUNT_PREFIX", default_value = "/v")]
    pub mount_prefix: String,
    /// JSON file declaring the served resources.
    #[arg(long, env = "RESTKIT_RESOURCES", value_name = "FILE")]
    pub resources: Option<PathBuf>,
    /// Accepted bearer tokens as `principal:token`, comma separated.
    #[arg(long = "api-token", env = "RESTKIT_API_TOKENS", value_delimiter = ',')]
    pub api_tokens: Vec<ApiToken>,
    /// Sustained requests per second allowed for each resource.
    #[arg(long, env = "RESTKIT_THROTTLE_PER_SECOND", default_value_t = 100)]
    pub throttle_per_second: u32,
    /// Burst allowance above the sustained rate.
    #[arg(long, env = "RESTKIT_THROTTLE_BURST", default_value_t = 200)]
    pub throttle_burst: u32,
    /// Turns rate limiting off.
    #[arg(long)]
    pub no_throttle: bool,
    /// Page size when a list request sends no `count`.
    #[arg(long, default_value_t = 20)]
    pub default_page_count: usize,
    /// Largest page size a client may ask for.
    #[arg(long, default_value_t = 100)]
    pub max_page_count: usize,
    /// Seconds before an unfinished request answers 408.
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,
    /// Allowed CORS origins, comma separated. `*` allows any.
    #[arg(long, value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
    #[arg(long, env = "RESTKIT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    /// Service settings. A default count above the maximum is lowered to it.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        let max_count = self.max_page_count.max(1);
        ServiceConfig {
            mount_prefix: self.mount_prefix.clone(),
            paging: PagingConfig {
                default_count: self.default_page_count.clamp(1, max_count),
                max_count,
            },
            throttle: ThrottleConfig {
                enabled: !self.no_throttle,
                per_second: self.throttle_per_second,
                burst: self.throttle_burst,
            },
            api_tokens: self.api_tokens.clone(),
            ..ServiceConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["restkit"]).unwrap();
        let service = cli.service_config();
        assert_eq!(service.mount_prefix, "/v");
        assert_eq!(service.paging, PagingConfig::default());
        assert_eq!(service.throttle, ThrottleConfig::default());
        assert!(service.api_tokens.is_empty());

        let network = cli.network_config();
        assert_eq!(network.port, 8080);
        assert_eq!(network.cors_origins, vec!["*"]);
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert!(cli.resources.is_none());
    }

    #[test]
    fn parses_tokens_and_limits() {
        let cli = Cli::try_parse_from([
            "restkit",
            "--api-token",
            "ops:abc,ci:def",
            "--no-throttle",
            "--default-page-count",
            "500",
            "--max-page-count",
            "50",
            "--log-format",
            "json",
            "--resources",
            "resources.json",
        ])
        .unwrap();
        let service = cli.service_config();
        assert_eq!(
            service.api_tokens,
            vec![ApiToken::new("ops", "abc"), ApiToken::new("ci", "def")]
        );
        assert!(!service.throttle.enabled);
        assert_eq!(service.paging.max_count, 50);
        assert_eq!(service.paging.default_count, 50);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.resources, Some(PathBuf::from("resources.json")));
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(Cli::try_parse_from(["restkit", "--api-token", "nocolon"]).is_err());
    }
}
