use std::path::PathBuf;

use clap::Parser;
use m1_assistant::config::Config;
use m1_assistant::session;
use m1_assistant::{AssistantError, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    let mut config = Config::from_env()?;
    cli.apply_overrides(&mut config);

    let outcome = session::run_task(&config, &cli.task, &cli.files)?;

    println!("{}", outcome.reply.trim());
    if outcome.artifacts.is_empty() {
        println!("\nNo working paper was written.");
    } else {
        println!();
        for path in &outcome.artifacts {
            println!("Working paper: {}", path.display());
        }
    }
    println!(
        "Tokens: {} in / {} out over {} calls",
        outcome.usage.total_prompt_tokens,
        outcome.usage.total_completion_tokens,
        outcome.usage.total_calls
    );
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "m1_assistant=debug"
    } else {
        "m1_assistant=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| AssistantError::Logging(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| AssistantError::Logging(e.to_string()))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Propose Schedule M-1 book-tax adjustments from trial balances and write them to an Excel working paper."
)]
struct Cli {
    /// What to ask of the assistant, e.g. "Prepare the 2023 M-1".
    task: String,

    /// Trial balance files (.csv or .xlsx).
    files: Vec<PathBuf>,

    /// Directory for the working paper when the model does not choose one.
    #[arg(long, short)]
    output_dir: Option<PathBuf>,

    /// Model to use instead of the configured default.
    #[arg(long)]
    model: Option<String>,

    /// Maximum number of model round trips.
    #[arg(long)]
    max_turns: Option<usize>,

    /// Enable debug logging.
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_turns) = self.max_turns {
            config.max_turns = max_turns;
        }
    }
}
