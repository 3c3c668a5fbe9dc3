use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use kome::config::Config;
use kome::logging::{self, LogLevel};
use kome::{init, run};

#[derive(Parser, Debug)]
#[command(name = "kome", version, about = "Terminal comment viewer for live streams")]
struct Args {
    /// Live id (`lv123`) or a watch URL containing one
    live: String,

    /// Directory holding kome.conf, the log file and the speaker database
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Log at DEBUG regardless of the configured level
    #[arg(short, long)]
    verbose: bool,

    /// Handshake timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

async fn start(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = Config::load(args.config_dir.unwrap_or_else(Config::default_dir))?;

    let level = if args.verbose { LogLevel::DEBUG } else { config.log_level };
    logging::init(config.log_path(), level)?;

    config.prompt_for_missing_fields()?;
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.handshake_timeout_secs));

    let clients = init(&mut config).await?;
    run(clients, &config, &args.live, timeout).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match start(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kome: {}", e);
            ExitCode::FAILURE
        }
    }
}
