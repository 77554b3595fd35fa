//! paramctl - inspect and tweak the live params of remote processes
//!
//! Subcommands:
//! - `paramctl connect <host>` - open a session and remember it
//! - `paramctl get <id>` / `set <id> <path> <value>` / `trigger <id> <path>`
//! - `paramctl snapshot <id>` / `restore-values <id>` - session values
//! - `paramctl sessions` / `forget <id>` / `restore` - persisted sessions
//! - `paramctl config` - effective configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paramconf::ParamsConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "paramctl")]
#[command(about = "Remote control for live-tunable params")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./paramsremote.toml)
    #[arg(long, global = true, env = "PARAMSREMOTE_CONFIG")]
    config: Option<PathBuf>,

    /// How long to wait for a schema, in milliseconds
    #[arg(long, global = true, default_value = "3000")]
    wait_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a param server and remember the session
    Connect {
        /// Host name or address
        host: String,

        /// Port (defaults to client.default_port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Use the OSC transport instead of WebSockets
        #[arg(long)]
        osc: bool,

        /// Keep running and print value changes until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },

    /// List remembered sessions
    Sessions,

    /// Print the current values of a session
    Get {
        /// Session id, e.g. wsock-127.0.0.1:8000
        id: String,

        /// Include image params
        #[arg(long)]
        images: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Send a new value for one param
    Set {
        id: String,
        path: String,
        value: String,
    },

    /// Fire a trigger param
    Trigger { id: String, path: String },

    /// Forget a remembered session and its settings
    Forget { id: String },

    /// Save the current values of a session for later restore
    Snapshot { id: String },

    /// Send saved values back to a session
    RestoreValues { id: String },

    /// Reconnect every remembered and bootstrap session
    Restore {
        /// Keep running and print value changes until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },

    /// Show the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = ParamsConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let filter = EnvFilter::try_new(&config.infra.telemetry.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = commands::Ctx::new(config, Duration::from_millis(cli.wait_ms));

    match cli.command {
        Commands::Connect {
            host,
            port,
            osc,
            watch,
        } => commands::connect(&ctx, &host, port, osc, watch).await,
        Commands::Sessions => commands::sessions(&ctx),
        Commands::Get { id, images, json } => commands::get(&ctx, &id, images, json).await,
        Commands::Set { id, path, value } => commands::set(&ctx, &id, &path, &value).await,
        Commands::Trigger { id, path } => commands::trigger(&ctx, &id, &path).await,
        Commands::Forget { id } => commands::forget(&ctx, &id),
        Commands::Snapshot { id } => commands::snapshot(&ctx, &id).await,
        Commands::RestoreValues { id } => commands::restore_values(&ctx, &id).await,
        Commands::Restore { watch } => commands::restore(&ctx, watch).await,
        Commands::Config => {
            render::print_config(&ctx.config, &sources);
            Ok(())
        }
    }
}
