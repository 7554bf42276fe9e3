//! hpad — the autoscaler daemon.
//!
//! Single binary that assembles the control loop:
//! - In-memory workload backend + managed pool
//! - Push-based metric feed
//! - Autoscaling controller
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! hpad run --config hpad.toml --listen 127.0.0.1:8480
//! hpad check-config --config hpad.toml
//! ```

mod daemon;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hpa_core::HpadConfig;

#[derive(Parser, Debug)]
#[command(name = "hpad", about = "Horizontal pod autoscaler daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control loop and the API server.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override `[server] listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Parse and validate a configuration file, then print the effective config.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            listen,
            log_format,
        } => {
            init_tracing(log_format);
            let config = load_config(config.as_deref())?;
            let listen = match listen {
                Some(addr) => addr,
                None => config
                    .server
                    .listen
                    .parse()
                    .with_context(|| format!("invalid listen address {:?}", config.server.listen))?,
            };
            daemon::run(&config, listen).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            let effective = config.autoscaler()?;
            println!("{}", config.to_toml_string()?);
            println!("# effective: {effective:?}");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hpad=debug,hpa=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Load the config file, or defaults when no file is given.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<HpadConfig> {
    let config = match path {
        Some(path) => HpadConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => HpadConfig::default(),
    };
    // Fail fast on invalid settings before anything starts.
    config.autoscaler()?;
    config.max_sample_age()?;
    Ok(config)
}
