//! Skywatch CLI - track reconciliation and chat choreography engine.

use clap::Parser;
use skywatch::cli::{Cli, Commands};
use skywatch::commands::{self, Output};
use skywatch::config::{Config, OutputFormat};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        built = env!("SKW_BUILD_TIMESTAMP"),
        commit = env!("SKW_GIT_COMMIT"),
        "skw starting"
    );

    let cli = Cli::parse();
    let human = cli.human_readable;

    let result = run_command(&cli, human);

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!(r#"{{"error": "{}"}}"#, e);
        }
        process::exit(1);
    }
}

fn run_command(cli: &Cli, human: bool) -> Result<(), skywatch::Error> {
    let mut config = Config::load(cli.config_path.as_deref())?;
    // Precedence: CLI flag > config file > default.
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    let human = human || config.output_format == OutputFormat::Human;

    match &cli.command {
        Commands::Run { events } => {
            let summary = commands::run(config, events.as_deref(), cli.data_dir.as_deref())?;
            output(&summary, human);
        }
        Commands::Radars => {
            let list = commands::radars(&config)?;
            output(&list, human);
        }
    }

    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
