// # wddnsd - Weighted DDNS Daemon
//
// The wddnsd daemon is responsible for:
// 1. Reading configuration from flags and environment variables
// 2. Generating (or accepting) this process's set identifier
// 3. Initializing logging and the runtime
// 4. Wiring the HTTP address sources and the Route 53 provider
// 5. Running the reconciliation loop until SIGTERM/SIGINT
//
// All DDNS logic lives in wddns-core; this is a thin integration layer.
//
// ## Configuration
//
// Every flag can also be set through the environment:
//
// - `-d, --domain` / `WDDNS_DOMAIN`: Record name (required)
// - `-z, --zone-id` / `WDDNS_ZONE_ID`: Route 53 hosted zone id (required)
// - `--ttl` / `WDDNS_TTL`: Record TTL in seconds
// - `-r, --refresh` / `WDDNS_REFRESH_MINUTES`: Minutes between cycles
// - `--weight` / `WDDNS_WEIGHT`: Routing weight (0-255)
// - `--set-identifier` / `WDDNS_SET_IDENTIFIER`: Pin the set identifier
// - `--source` / `WDDNS_SOURCES`: Address source, `URL` or `URL=WEIGHT`
// - `--dry-run` / `WDDNS_DRY_RUN`: Log changes instead of applying them
//
// AWS credentials and region come from the standard AWS environment.
//
// ## Example
//
// ```bash
// export AWS_PROFILE=ddns
// wddnsd -d home.example.com -z Z123 --ttl 60 -r 1
// ```

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use wddns_core::config::{DetectorConfig, EngineConfig, ProviderConfig, RecordConfig, SourceConfig, WddnsConfig};
use wddns_core::{AddressDetector, Identity, RecordReconciler, ReconciliationLoop};
use wddns_provider_route53::Route53Provider;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WddnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WddnsExitCode> for ExitCode {
    fn from(code: WddnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep a weighted Route 53 A-record pointed at this host's public IPv4 address
#[derive(Debug, Parser)]
#[command(name = "wddnsd", version, about)]
struct Args {
    /// Record name to keep in sync (e.g. home.example.com)
    #[arg(short = 'd', long, env = "WDDNS_DOMAIN")]
    domain: String,

    /// Route 53 hosted zone id
    #[arg(short = 'z', long = "zone-id", env = "WDDNS_ZONE_ID")]
    zone_id: String,

    /// Record TTL in seconds
    #[arg(long, env = "WDDNS_TTL", default_value_t = 60)]
    ttl: u32,

    /// Minutes between cycles
    #[arg(short = 'r', long, env = "WDDNS_REFRESH_MINUTES", default_value_t = 1)]
    refresh: u64,

    /// Routing weight of this host's record
    #[arg(long, env = "WDDNS_WEIGHT", default_value_t = 1)]
    weight: u8,

    /// Use this set identifier instead of a random one
    #[arg(long = "set-identifier", env = "WDDNS_SET_IDENTIFIER")]
    set_identifier: Option<String>,

    /// Comment attached to each change batch
    #[arg(long, env = "WDDNS_COMMENT", default_value = wddns_core::config::DEFAULT_COMMENT)]
    comment: String,

    /// Address source, `URL` or `URL=WEIGHT` (repeatable)
    #[arg(long = "source", env = "WDDNS_SOURCES", value_delimiter = ',')]
    sources: Vec<String>,

    /// Per-source timeout in seconds
    #[arg(long = "source-timeout", env = "WDDNS_SOURCE_TIMEOUT_SECS", default_value_t = 5)]
    source_timeout: u64,

    /// Route 53 call timeout in seconds
    #[arg(long = "upsert-timeout", env = "WDDNS_UPSERT_TIMEOUT_SECS", default_value_t = 30)]
    upsert_timeout: u64,

    /// Cap in minutes on the wait between rejected upserts
    #[arg(long = "max-backoff", env = "WDDNS_MAX_BACKOFF_MINUTES", default_value_t = 30)]
    max_backoff: u64,

    /// Log intended changes without calling Route 53
    #[arg(long = "dry-run", env = "WDDNS_DRY_RUN")]
    dry_run: bool,

    /// Log level
    #[arg(
        long = "log-level",
        env = "WDDNS_LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        ignore_case = true
    )]
    log_level: String,
}

impl Args {
    /// Build and validate the runtime configuration
    fn to_config(&self) -> wddns_core::Result<WddnsConfig> {
        let sources = if self.sources.is_empty() {
            DetectorConfig::default().sources
        } else {
            self.sources
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(SourceConfig::parse)
                .collect::<wddns_core::Result<Vec<_>>>()?
        };

        let mut record = RecordConfig::new(self.domain.trim(), self.zone_id.trim())
            .with_ttl(self.ttl)
            .with_weight(self.weight);
        record.set_identifier = self.set_identifier.clone();
        record.comment = self.comment.clone();

        let refresh_interval_secs = self
            .refresh
            .checked_mul(60)
            .ok_or_else(|| wddns_core::Error::config("Refresh interval is too large"))?;
        let max_backoff_secs = self
            .max_backoff
            .checked_mul(60)
            .ok_or_else(|| wddns_core::Error::config("Maximum backoff is too large"))?;

        let config = WddnsConfig {
            record,
            detector: DetectorConfig {
                sources,
                source_timeout_secs: self.source_timeout,
            },
            provider: ProviderConfig {
                upsert_timeout_secs: self.upsert_timeout,
                dry_run: self.dry_run,
            },
            engine: EngineConfig {
                refresh_interval_secs,
                max_backoff_secs,
                ..EngineConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => WddnsExitCode::CleanShutdown,
                _ => WddnsExitCode::ConfigError,
            }
            .into();
        }
    };

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return WddnsExitCode::ConfigError.into();
        }
    };

    // One identity per process, fixed before the loop starts
    let identity = match Identity::from_config(config.record.set_identifier.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return WddnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(args.log_level()).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WddnsExitCode::ConfigError.into();
    }

    info!("Starting wddnsd daemon");
    info!(
        "Record {} in zone {} (ttl {}, weight {}, set identifier {})",
        config.record.name,
        config.record.normalized_zone_id(),
        config.record.ttl,
        config.record.weight,
        identity
    );
    info!(
        "{} address source(s), refresh every {:?}",
        config.detector.sources.len(),
        config.engine.refresh_interval()
    );
    match serde_json::to_string(&config) {
        Ok(json) => debug!("Effective configuration: {}", json),
        Err(e) => debug!("Could not serialize configuration: {}", e),
    }
    if config.provider.dry_run {
        warn!("Dry-run mode: Route 53 will not be modified");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WddnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, identity).await {
            error!("Daemon error: {:#}", e);
            WddnsExitCode::RuntimeError
        } else {
            WddnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: WddnsConfig, identity: Identity) -> Result<()> {
    let sources = wddns_ip_http::build_sources(&config.detector).context("Failed to build address sources")?;
    let detector = AddressDetector::new(sources, config.detector.source_timeout())?;

    let provider = Route53Provider::from_env(config.provider.dry_run).await;
    let reconciler = RecordReconciler::new(
        Box::new(provider),
        &config.record,
        identity,
        config.provider.upsert_timeout(),
    );

    let (mut engine, mut events) = ReconciliationLoop::new(detector, reconciler, &config.engine)?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Loop event: {:?}", event);
        }
    });

    let shutdown_rx = install_shutdown_handler()?;

    info!("Starting reconciliation loop");
    engine.run_with_shutdown(Some(shutdown_rx)).await?;

    info!("Shutting down daemon");
    Ok(())
}

/// Install SIGTERM/SIGINT handlers and return a receiver that fires on either
///
/// Handlers are registered before returning, so a failure surfaces at startup.
#[cfg(unix)]
fn install_shutdown_handler() -> Result<oneshot::Receiver<()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
        let _ = tx.send(());
    });

    Ok(rx)
}

/// Install a Ctrl-C handler and return a receiver that fires on it
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn install_shutdown_handler() -> Result<oneshot::Receiver<()>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal: SIGINT");
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("wddnsd").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_without_optional_flags() {
        let args = parse(&["-d", "home.example.com", "-z", "Z123"]).unwrap();
        let config = args.to_config().unwrap();

        assert_eq!(config.record.name, "home.example.com");
        assert_eq!(config.record.zone_id, "Z123");
        assert_eq!(config.record.ttl, 60);
        assert_eq!(config.record.weight, 1);
        assert_eq!(config.record.set_identifier, None);
        assert_eq!(config.engine.refresh_interval_secs, 60);
        assert_eq!(config.engine.max_backoff_secs, 30 * 60);
        assert_eq!(config.detector.sources.len(), wddns_core::config::DEFAULT_ADDRESS_SERVICES.len());
        assert!(!config.provider.dry_run);
        assert_eq!(args.log_level(), Level::INFO);
    }

    #[test]
    fn missing_required_flags_is_config_error() {
        let err = parse(&["-d", "home.example.com"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn help_is_not_an_error_kind() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn sources_and_weights_are_parsed() {
        let args = parse(&[
            "-d",
            "home.example.com",
            "-z",
            "/hostedzone/Z123",
            "--source",
            "https://api.ipify.org",
            "--source",
            "https://icanhazip.com=2,https://ifconfig.me/ip",
            "-r",
            "5",
            "--weight",
            "10",
            "--set-identifier",
            "edge-1",
            "--log-level",
            "DEBUG",
        ])
        .unwrap();
        let config = args.to_config().unwrap();

        assert_eq!(config.record.normalized_zone_id(), "Z123");
        assert_eq!(config.record.weight, 10);
        assert_eq!(config.record.set_identifier.as_deref(), Some("edge-1"));
        assert_eq!(config.engine.refresh_interval_secs, 300);
        let weights: Vec<u32> = config.detector.sources.iter().map(|s| s.weight).collect();
        assert_eq!(weights, vec![1, 2, 1]);
        assert_eq!(args.log_level(), Level::DEBUG);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = parse(&["-d", "bad..example.com", "-z", "Z123"]).unwrap();
        assert!(args.to_config().unwrap_err().is_config());

        let args = parse(&["-d", "home.example.com", "-z", "Z123", "-r", "0"]).unwrap();
        assert!(args.to_config().is_err());

        let args = parse(&["-d", "home.example.com", "-z", "Z123", "--source", "ftp://example.net"]).unwrap();
        assert!(args.to_config().is_err());

        assert!(parse(&["-d", "home.example.com", "-z", "Z123", "--weight", "256"]).is_err());
        assert!(parse(&["-d", "home.example.com", "-z", "Z123", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn exit_codes_match_systemd_conventions() {
        assert_eq!(WddnsExitCode::CleanShutdown as u8, 0);
        assert_eq!(WddnsExitCode::ConfigError as u8, 1);
        assert_eq!(WddnsExitCode::RuntimeError as u8, 2);
    }
}
