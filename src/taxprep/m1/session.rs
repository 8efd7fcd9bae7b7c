use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::taxprep::m1::agent::{Agent, AgentConfig, AgentOutcome};
use crate::taxprep::m1::config::Config;
use crate::taxprep::m1::error::Result;
use crate::taxprep::m1::io;
use crate::taxprep::m1::model::TrialBalanceRow;
use crate::taxprep::m1::provider::{AnthropicProvider, ChatMessage, LlmProvider};
use crate::taxprep::m1::tool::{ToolRegistry, WorkingPaperTool};

/// A trial balance file after loading.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub rows: Vec<TrialBalanceRow>,
}

/// Loads every input file. The first failure aborts the run.
pub fn load_files(paths: &[PathBuf]) -> Result<Vec<LoadedFile>> {
    paths
        .iter()
        .map(|path| -> Result<LoadedFile> {
            Ok(LoadedFile {
                path: path.clone(),
                rows: io::load_trial_balance(path)?,
            })
        })
        .collect()
}

/// Renders the opening user message: the task followed by each file's rows.
pub fn build_conversation(task: &str, files: &[LoadedFile]) -> Result<Vec<ChatMessage>> {
    let mut content = task.trim().to_string();

    for file in files {
        let rows = serde_json::to_string_pretty(&file.rows)?;
        content.push_str(&format!(
            "\n\nFile: {} ({} rows)\n```json\n{}\n```",
            display_name(&file.path),
            file.rows.len(),
            rows
        ));
    }

    Ok(vec![ChatMessage::user(content)])
}

/// Loads the inputs and runs the agent against the configured model.
#[instrument(
    level = "info",
    skip_all,
    fields(run_id = %Uuid::new_v4(), files = paths.len())
)]
pub fn run_task(config: &Config, task: &str, paths: &[PathBuf]) -> Result<AgentOutcome> {
    let files = load_files(paths)?;
    for file in &files {
        info!(input = %describe(file), "input ready");
    }
    let provider = AnthropicProvider::new(config.provider_config())?;
    info!(model = %provider.default_model(), "starting agent");
    run_with_provider(provider, config, task, &files)
}

/// Runs the agent over already loaded files with any provider.
pub fn run_with_provider<P: LlmProvider>(
    provider: P,
    config: &Config,
    task: &str,
    files: &[LoadedFile],
) -> Result<AgentOutcome> {
    let messages = build_conversation(task, files)?;
    let tools = ToolRegistry::new().register(WorkingPaperTool::new(&config.output_dir));
    let agent = Agent::with_config(
        provider,
        tools,
        AgentConfig {
            model: Some(config.model.clone()),
            max_turns: config.max_turns,
            ..AgentConfig::default()
        },
    );
    agent.run(messages)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Summarises a loaded file for logging and console output.
pub fn describe(file: &LoadedFile) -> Value {
    serde_json::json!({
        "file": display_name(&file.path),
        "rows": file.rows.len(),
        "columns": file.rows.first().map(|row| row.columns().collect::<Vec<_>>()),
    })
}
