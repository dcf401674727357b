mod handler;
mod run_commands;
mod session_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    zenor_config::ZenorConfig,
};

#[derive(Parser)]
#[command(name = "zenor", about = "Zenor, a WhatsApp Web bot runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the default locations.
    #[arg(long, global = true, env = "ZENOR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the stored credentials (overrides config value).
    #[arg(long, global = true, env = "ZENOR_SESSION_DIR")]
    session_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run the bot (default when no subcommand is provided).
    Run,
    /// Session credential tools.
    Session {
        #[command(subcommand)]
        action: session_commands::SessionAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// File config, then legacy environment variables, then command-line flags.
fn load_config(cli: &Cli) -> ZenorConfig {
    let mut config = zenor_config::discover_and_load(cli.config.as_deref());
    zenor_config::apply_env_overrides(&mut config);
    if let Some(dir) = &cli.session_dir {
        config.session.dir = dir.clone();
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "zenor starting");

    let config = load_config(&cli);

    match cli.command {
        None | Some(Commands::Run) => run_commands::run(config).await,
        Some(Commands::Session { action }) => {
            session_commands::handle_session(action, &config).await
        },
    }
}
