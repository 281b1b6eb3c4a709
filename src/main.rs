// src/main.rs
//! `nursery`: runs one Federation node until it is killed or fails
//! to start.

use clap::Parser;
use nursery_core::config::NurseryConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "nursery", about = "Run one Federation Nursery node")]
struct Args {
    /// Per-node YAML config.
    #[arg(short = 'c', long = "config", default_value = "nursery.yaml")]
    config: PathBuf,

    /// Dump the normalized config as indented JSON and exit.
    #[arg(short = 's', long = "show")]
    show: bool,

    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn load_config(path: &PathBuf) -> nursery_core::Result<NurseryConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| nursery_core::Error::Config(format!("failed to read {path:?}: {e}")))?;
    let config: NurseryConfig = serde_yaml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    nursery_core::logging::init(args.verbose);

    let config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if args.show {
        if let Err(e) = nursery_core::logging::print_json(&config) {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
        return ExitCode::SUCCESS;
    }

    if let Err(e) = nursery_core::node::run_node(config).await {
        tracing::error!("{e}");
        return ExitCode::from(e.exit_code() as u8);
    }

    ExitCode::SUCCESS
}
