//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use streampick_service::config::Config;
use streampick_service::metrics;
use streampick_service::resolver::StreamResolver;
use streampick_service::types::RequestExtras;

use crate::healthcheck;
use crate::logging;
use crate::server;

/// StreamPick commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server.
    Run,

    /// Check the health of a running instance.
    Healthcheck {
        /// The address of the instance, defaults to the configured bind address.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Seconds to wait for a response.
        #[arg(long, default_value_t = 2)]
        timeout: u64,
    },

    /// Resolve the best stream for a single media item and print it as JSON.
    Resolve {
        /// The content type, `movie` or `series`.
        content_type: String,

        /// The media id, for example `tt0111161` or `tt0944947:1:2`.
        id: String,

        /// Request extras in the addon configuration format, for example `sort=size|realdebrid=KEY`.
        #[arg(long, default_value = "")]
        extras: String,
    },
}

/// Picks the best playable stream for movies and series episodes.
#[derive(Parser, Debug)]
#[command(name = "streampick", version, about)]
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
        release: sentry::release_name!(),
        session_mode: sentry::SessionMode::Request,
        auto_session_tracking: false,
        ..Default::default()
    });

    // still single-threaded, no runtime has been started yet
    logging::init_logging(&config);

    if let Some(ref statsd) = config.metrics.statsd {
        let mut tags = config.metrics.custom_tags.clone();
        if let Some(hostname_tag) = config.metrics.hostname_tag.clone() {
            if let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok()) {
                tags.insert(hostname_tag, hostname);
            }
        }
        metrics::configure_statsd(&config.metrics.prefix, statsd, tags)?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Healthcheck { addr, timeout } => {
            healthcheck::healthcheck(&config, addr, Duration::from_secs(timeout))?
        }
        Command::Resolve {
            content_type,
            id,
            extras,
        } => resolve_once(config, &content_type, &id, &extras)?,
    }

    Ok(())
}

fn resolve_once(config: Config, content_type: &str, id: &str, extras: &str) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        let resolver = StreamResolver::from_config(&config)?;
        let extras = RequestExtras::parse(extras);
        anyhow::Ok(resolver.resolve(content_type, id, &extras).await?)
    })?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
