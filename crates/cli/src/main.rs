use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wabridge_channels::noop::NoopConnector,
};

#[derive(Parser)]
#[command(name = "wabridge", about = "wabridge: messaging session gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,
        /// Config file; discovered from the working directory and the user
        /// config directory when omitted.
        #[arg(long, env = "WABRIDGE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration as TOML.
    Show {
        #[arg(long, env = "WABRIDGE_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");

    match cli.command {
        Commands::Gateway { bind, port, config } => {
            let mut config = wabridge_config::load(config.as_deref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            // The messaging provider runs outside this process; until one is
            // wired in, sessions never authenticate and sends are rejected.
            let connector = Arc::new(NoopConnector::default());
            wabridge_gateway::start_gateway(config, connector).await
        },
        Commands::Config {
            action: ConfigAction::Show { config },
        } => {
            let config = wabridge_config::load(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
    }
}
