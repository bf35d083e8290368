//! `formgen` - inspect AI form definitions and exercise the review workflow offline

mod simulate;
mod validate;

use clap::{Parser, Subcommand};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "formgen", version, about = "Formgen review workflow tools")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a form definition against the integrity rules
    Validate(validate::ValidateArgs),
    /// Run review, regenerate and approve against in-memory collaborators
    Simulate(simulate::SimulateArgs),
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let passed = match cli.command {
        Command::Validate(args) => validate::run(&args)?,
        Command::Simulate(args) => simulate::run(&args).await?,
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Read a definition file
pub(crate) fn load_definition(path: &Path) -> anyhow::Result<formgen_definition::FormDefinition> {
    use anyhow::Context;

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    formgen_definition::FormDefinition::from_json_str(&text)
        .with_context(|| format!("parsing {}", path.display()))
}
