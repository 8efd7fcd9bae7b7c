//! Anthropic Messages API provider implementation

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::*;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model().to_string());
        let api_request = build_request(&request, model, self.config.max_tokens)?;
        debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            let text = response.text().unwrap_or_default();

            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
                StatusCode::UNAUTHORIZED => ProviderError::AuthenticationFailed,
                _ => ProviderError::Api {
                    status: status.as_u16(),
                    message: text,
                },
            });
        }

        let api_response: AnthropicResponse = response
            .json()
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_response(api_response)
    }
}

fn build_request(
    request: &CompletionRequest,
    model: String,
    max_tokens: usize,
) -> Result<AnthropicRequest, ProviderError> {
    let (system, messages) = convert_messages(&request.messages)?;

    Ok(AnthropicRequest {
        model,
        messages,
        system,
        max_tokens,
        tools: request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect(),
    })
}

/// Maps the chat history onto Anthropic's alternating user/assistant turns.
/// System messages move to the top-level `system` field and consecutive tool
/// results are folded into a single user turn.
fn convert_messages(
    messages: &[ChatMessage],
) -> Result<(Option<String>, Vec<AnthropicMessage>), ProviderError> {
    let mut system: Vec<String> = Vec::new();
    let mut converted: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system.extend(msg.content.clone()),
            Role::User => converted.push(AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock::Text {
                    text: msg.content.clone().unwrap_or_default(),
                }],
            }),
            Role::Assistant => {
                let mut content = Vec::new();
                if let Some(text) = msg.content.as_ref().filter(|text| !text.is_empty()) {
                    content.push(AnthropicContentBlock::Text { text: text.clone() });
                }
                for call in &msg.tool_calls {
                    let input = serde_json::from_str(&call.arguments)
                        .map_err(|e| ProviderError::Parse(e.to_string()))?;
                    content.push(AnthropicContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input,
                    });
                }
                converted.push(AnthropicMessage {
                    role: "assistant",
                    content,
                });
            }
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone().unwrap_or_default(),
                    is_error: msg.is_error,
                };
                match converted.last_mut() {
                    Some(last) if last.role == "user" && last.holds_tool_results() => {
                        last.content.push(block);
                    }
                    _ => {
                        converted.push(AnthropicMessage {
                            role: "user",
                            content: vec![block],
                        });
                    }
                }
            }
        }
    }

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    Ok((system, converted))
}

fn parse_response(api_response: AnthropicResponse) -> Result<CompletionResponse, ProviderError> {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in api_response.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments =
                    serde_json::to_string(&input).map_err(|e| ProviderError::Parse(e.to_string()))?;
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
            ContentBlock::Other => {}
        }
    }

    let finish_reason = match api_response.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    };

    let usage = Usage {
        prompt_tokens: api_response.usage.input_tokens,
        completion_tokens: api_response.usage.output_tokens,
        total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
    };

    Ok(CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content: if content.is_empty() { None } else { Some(content) },
        tool_calls,
        finish_reason,
        usage,
    })
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicContentBlock>,
}

impl AnthropicMessage {
    fn holds_tool_results(&self) -> bool {
        self.content
            .iter()
            .all(|block| matches!(block, AnthropicContentBlock::ToolResult { .. }))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You prepare Schedule M-1."),
            ChatMessage::user("Propose adjustments."),
            ChatMessage::assistant_tool_calls(
                Some("Writing the working paper.".into()),
                vec![
                    ToolCall {
                        id: "toolu_1".into(),
                        name: "generate_m1_working_paper".into(),
                        arguments: r#"{"currentYear":"2023"}"#.into(),
                    },
                    ToolCall {
                        id: "toolu_2".into(),
                        name: "generate_m1_working_paper".into(),
                        arguments: "{}".into(),
                    },
                ],
            ),
            ChatMessage::tool_result("toolu_1", r#"{"success":true}"#, false),
            ChatMessage::tool_result("toolu_2", "bad arguments", true),
        ]
    }

    #[test]
    fn system_prompt_is_lifted_and_tool_results_are_folded() {
        let (system, messages) = convert_messages(&conversation()).unwrap();
        assert_eq!(system.as_deref(), Some("You prepare Schedule M-1."));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content.len(), 2);
    }

    #[test]
    fn request_serialises_tool_use_and_results() {
        let request = CompletionRequest::new(conversation()).with_tools(vec![
            ToolDefinition::new("generate_m1_working_paper", "Writes the workbook"),
        ]);
        let api_request = build_request(&request, DEFAULT_MODEL.into(), 1024).unwrap();
        let value = serde_json::to_value(&api_request).unwrap();

        assert_eq!(value["max_tokens"], json!(1024));
        assert_eq!(value["tools"][0]["name"], json!("generate_m1_working_paper"));
        assert_eq!(value["messages"][1]["content"][1]["type"], json!("tool_use"));
        assert_eq!(
            value["messages"][1]["content"][1]["input"],
            json!({"currentYear": "2023"})
        );
        let results = &value["messages"][2]["content"];
        assert_eq!(results[0]["type"], json!("tool_result"));
        assert!(results[0].get("is_error").is_none());
        assert_eq!(results[1]["is_error"], json!(true));
    }

    #[test]
    fn response_blocks_become_text_and_tool_calls() {
        let api_response: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": DEFAULT_MODEL,
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Calling the tool."},
                {"type": "tool_use", "id": "toolu_9", "name": "generate_m1_working_paper",
                 "input": {"currentYear": "2023"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        }))
        .unwrap();

        let response = parse_response(api_response).unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.content.as_deref(), Some("Calling the tool."));
        assert_eq!(response.tool_calls[0].id, "toolu_9");
        assert_eq!(response.tool_calls[0].arguments, r#"{"currentYear":"2023"}"#);
        assert_eq!(response.usage.total_tokens, 20);
    }
}
