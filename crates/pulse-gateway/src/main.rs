//! # pulse-gateway
//!
//! Call-signaling and presence gateway binary. Loads settings, wires the
//! signaling hub to a profile backend and serves the `WebSocket` endpoint.

#![deny(unsafe_code)]

mod profiles;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_core::logging::{LogFormat, init_subscriber};
use pulse_server::config::coordinator_config;
use pulse_server::{PulseServer, ServerConfig};
use pulse_settings::PulseSettings;
use pulse_signaling::{CallCoordinator, ConnectionRegistry, SignalingHub};

/// Pulse call-signaling gateway.
#[derive(Parser, Debug)]
#[command(name = "pulse-gateway", about = "Real-time call signaling and presence gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.pulse/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Refuse call events that do not match the call's state.
    #[arg(long)]
    strict: bool,

    /// Expire unanswered calls after this many milliseconds.
    #[arg(long)]
    ring_timeout_ms: Option<u64>,

    /// Log filter level (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings.clone().unwrap_or_else(pulse_settings::settings_path)
    }

    /// Apply flags over loaded settings and re-validate.
    fn apply(&self, settings: &mut PulseSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.strict {
            settings.signaling.strict_transitions = true;
        }
        if let Some(ms) = self.ring_timeout_ms {
            settings.signaling.ring_timeout_ms = ms;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        settings.validate().context("Invalid settings after command-line overrides")
    }
}

fn build_hub(settings: &PulseSettings) -> Result<Arc<SignalingHub>> {
    let coordinator = coordinator_config(&settings.signaling);
    let profiles = profiles::build_profile_lookup(&settings.profiles, coordinator.profile_lookup_timeout)?;
    let registry = Arc::new(ConnectionRegistry::new());
    let calls = Arc::new(CallCoordinator::new(Arc::clone(&registry), profiles, coordinator));
    Ok(Arc::new(SignalingHub::new(registry, calls)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings_path();
    let mut settings = pulse_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings)?;

    init_subscriber(&settings.logging.level, settings.logging.format);

    let hub = build_hub(&settings)?;
    let metrics = pulse_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = PulseServer::new(ServerConfig::from(&settings), hub).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        %addr,
        strict = settings.signaling.strict_transitions,
        ring_timeout_ms = settings.signaling.ring_timeout_ms,
        profiles = ?settings.profiles.source,
        "Pulse gateway ready on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(Duration::from_secs(10)))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_are_empty() {
        let cli = Cli::parse_from(["pulse-gateway"]);
        assert_eq!(cli.host, None);
        assert_eq!(cli.port, None);
        assert!(!cli.strict);
        assert_eq!(cli.ring_timeout_ms, None);
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "pulse-gateway",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--strict",
            "--ring-timeout-ms",
            "30000",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(8080));
        assert!(cli.strict);
        assert_eq!(cli.ring_timeout_ms, Some(30_000));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["pulse-gateway", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn settings_path_defaults_under_pulse_dir() {
        let cli = Cli::parse_from(["pulse-gateway"]);
        assert!(cli.settings_path().ends_with(".pulse/settings.json"));

        let cli = Cli::parse_from(["pulse-gateway", "--settings", "/etc/pulse.json"]);
        assert_eq!(cli.settings_path(), PathBuf::from("/etc/pulse.json"));
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from(["pulse-gateway", "--port", "7000", "--strict", "--log-level", "debug"]);
        let mut settings = PulseSettings::default();
        cli.apply(&mut settings).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert!(settings.signaling.strict_transitions);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn settings_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 6001}, "signaling": {"ringTimeoutMs": 5000}}"#).unwrap();

        let mut settings = pulse_settings::load_file_layer(&path).unwrap();
        let cli = Cli::parse_from(["pulse-gateway", "--ring-timeout-ms", "0"]);
        cli.apply(&mut settings).unwrap();
        assert_eq!(settings.server.port, 6001);
        assert_eq!(settings.signaling.ring_timeout_ms, 0);
    }

    #[tokio::test]
    async fn hub_builds_from_default_settings() {
        let hub = build_hub(&PulseSettings::default()).unwrap();
        assert!(hub.registry().is_empty());
        assert!(!hub.calls().config().strict_transitions);
    }
}
