//! Agent loop: lets the model propose adjustments and call tools until it
//! produces a final answer.

use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use crate::taxprep::m1::error::{AssistantError, Result};
use crate::taxprep::m1::provider::{ChatMessage, CompletionRequest, LlmProvider, UsageTracker};
use crate::taxprep::m1::tool::ToolRegistry;

/// Instructions given to the model at the start of every run.
pub const SYSTEM_PROMPT: &str = "\
You are a corporate tax preparer reconciling book income to taxable income on \
Form 1120 Schedule M-1.

You receive one or more trial balances as JSON rows. Identify the accounts that \
give rise to book-tax differences and classify each adjustment as Permanent \
(for example meals limitations, fines and penalties, federal income tax expense, \
tax-exempt interest) or Temporary (for example depreciation, bad debt reserves, \
accrued compensation, prepaid income). For every adjustment give the account, \
type, amount, a short explanation, and when you can the supporting IRC section \
and the M-1 line.

When the adjustments are settled, call generate_m1_working_paper exactly once. \
Pass the current-year trial balance rows unchanged as currentTB and the prior-year \
rows, if any, as priorTB. Afterwards summarise the adjustments and report where \
the working paper was written. If the tool reports an error, fix the arguments \
and call it again.";

/// Settings for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model to request; the provider default when `None`.
    pub model: Option<String>,
    /// Upper bound on model round trips.
    pub max_turns: usize,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_turns: 8,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Final text reply from the model.
    pub reply: String,
    /// Number of tool calls dispatched during the run.
    pub tool_calls: usize,
    /// Files written by successful tool calls, in order.
    pub artifacts: Vec<PathBuf>,
    pub usage: UsageTracker,
    /// Full conversation, including tool traffic.
    pub transcript: Vec<ChatMessage>,
}

/// The agent orchestrator: model <-> tools loop.
pub struct Agent<P> {
    provider: P,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl<P: LlmProvider> Agent<P> {
    pub fn new(provider: P, tools: ToolRegistry) -> Self {
        Self::with_config(provider, tools, AgentConfig::default())
    }

    pub fn with_config(provider: P, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Runs the conversation until the model answers without calling a tool.
    ///
    /// Tool calls within one turn are dispatched sequentially, in the order
    /// the model listed them.
    #[instrument(level = "info", skip_all, fields(provider = self.provider.name()))]
    pub fn run(&self, messages: Vec<ChatMessage>) -> Result<AgentOutcome> {
        let mut transcript = Vec::with_capacity(messages.len() + 1);
        transcript.push(ChatMessage::system(&self.config.system_prompt));
        transcript.extend(messages);

        let definitions = self.tools.definitions();
        let mut usage = UsageTracker::new();
        let mut tool_calls = 0;
        let mut artifacts = Vec::new();

        for turn in 1..=self.config.max_turns {
            let mut request =
                CompletionRequest::new(transcript.clone()).with_tools(definitions.clone());
            if let Some(model) = &self.config.model {
                request = request.with_model(model);
            }

            let response = self.provider.complete(request)?;
            usage.track(&response.model, &response.usage);
            debug!(
                turn,
                finish_reason = ?response.finish_reason,
                tool_calls = response.tool_calls.len(),
                "model responded"
            );

            if response.tool_calls.is_empty() {
                let reply = response.content.unwrap_or_default();
                transcript.push(ChatMessage::assistant(&reply));
                info!(turn, tool_calls, "agent finished");
                return Ok(AgentOutcome {
                    reply,
                    tool_calls,
                    artifacts,
                    usage,
                    transcript,
                });
            }

            let calls = response.tool_calls;
            transcript.push(ChatMessage::assistant_tool_calls(
                response.content,
                calls.clone(),
            ));

            for call in &calls {
                tool_calls += 1;
                let reply = self.tools.dispatch(call);
                if reply.is_error {
                    warn!(tool = %call.name, content = %reply.content, "tool call failed");
                }
                artifacts.extend(reply.artifacts);
                transcript.push(ChatMessage::tool_result(
                    &call.id,
                    reply.content,
                    reply.is_error,
                ));
            }
        }

        Err(AssistantError::TurnLimitExceeded(self.config.max_turns))
    }
}
