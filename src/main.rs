//! nn-bridge CLI
//!
//! Command-line interface for inspecting models and rendering them offline.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::debug;

use nn_bridge::cli::commands::{self, PerformOptions, RenderOptions};
use nn_bridge::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    debug!("nn-bridge v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd, cli.config.as_deref()),
        None => {
            println!("nn-bridge v{}", env!("CARGO_PKG_VERSION"));
            println!("{}", nn_bridge::neural::device::device_status_summary());
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: Option<&std::path::Path>) -> Result<()> {
    match cmd {
        Commands::Inspect { model } => commands::inspect(&model),
        Commands::Get { model, attribute } => commands::get(&model, &attribute),
        Commands::Set {
            model,
            attribute,
            values,
        } => commands::set(&model, &attribute, &values),
        Commands::Perform {
            model,
            method,
            input,
            gpu,
            assignments,
        } => {
            let options = PerformOptions {
                model,
                method,
                input,
                gpu,
                assignments,
            };
            commands::perform(commands::load_config(config)?, &options)
        }
        Commands::Render {
            model,
            method,
            input,
            block_size,
            blocks,
            buffer_size,
            sample_rate,
            gpu,
            assignments,
            output,
        } => {
            let options = RenderOptions {
                model,
                method,
                input,
                block_size,
                blocks,
                buffer_size,
                sample_rate,
                gpu,
                assignments,
                output,
            };
            commands::render(commands::load_config(config)?, &options)
        }
        Commands::Scan { dir } => commands::scan(&dir),
        Commands::Demo { path, kind } => commands::demo(&path, &kind),
    }
}
