//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sidebyside_service::config::Config;
use sidebyside_service::metrics;

use crate::{healthcheck, logging, server};

fn get_long_crate_version() -> &'static str {
    concat!(
        "version: ",
        env!("CARGO_PKG_VERSION"),
        "\ngit commit: ",
        env!("SIDEBYSIDE_GIT_VERSION")
    )
}

/// Side-by-side commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server.
    Run,

    /// Check the health of a running server.
    Healthcheck {
        /// Address of the server, defaults to the configured bind address.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// Side-by-side programming language comparisons.
#[derive(Parser, Debug)]
#[command(bin_name = "sidebyside", version, long_version = get_long_crate_version())]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: Some(env!("SIDEBYSIDE_RELEASE").into()),
        session_mode: sentry::SessionMode::Request,
        auto_session_tracking: false,
        ..Default::default()
    });

    // SAFETY: We are still single-threaded, the runtime is started by `server::run`.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Healthcheck { addr, timeout } => healthcheck::healthcheck(config, addr, timeout)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_long_version() {
        let version = get_long_crate_version();
        assert!(version.starts_with(concat!("version: ", env!("CARGO_PKG_VERSION"))));
        assert!(version.contains("\ngit commit: "));

        let err = Cli::try_parse_from(["sidebyside", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_parse_healthcheck() {
        let cli = Cli::try_parse_from([
            "sidebyside",
            "healthcheck",
            "--addr",
            "127.0.0.1:5000",
            "--config",
            "sidebyside.yml",
        ])
        .unwrap();
        assert_eq!(cli.config(), Some(Path::new("sidebyside.yml")));
        assert!(matches!(
            cli.command,
            Command::Healthcheck {
                addr: Some(_),
                timeout: 5
            }
        ));
    }
}
