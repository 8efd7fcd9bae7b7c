//! Tools the agent may call, with their declared input schemas.
//!
//! Tool payloads arrive as raw JSON written by the model. They are parsed
//! into strongly-typed arguments and validated before anything runs; a
//! payload that does not fit is answered with a descriptive error reply so
//! the model can correct itself.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::taxprep::m1::error::{AssistantError, Result};
use crate::taxprep::m1::model::{
    Adjustment, TrialBalanceRow, WorkingPaperRequest, WorkingPaperResult,
};
use crate::taxprep::m1::provider::{ToolCall, ToolDefinition};
use crate::taxprep::m1::workpaper::{self, DEFAULT_OUTPUT_DIR};

/// Stable name under which the working paper tool is exposed.
pub const WORKING_PAPER_TOOL: &str = "generate_m1_working_paper";

/// What a tool hands back to the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    /// Text relayed to the model as the tool result.
    pub content: String,
    /// Marks replies that describe a failed invocation.
    pub is_error: bool,
    /// Files the invocation wrote, if any.
    pub artifacts: Vec<PathBuf>,
}

impl ToolReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            artifacts: Vec::new(),
        }
    }
}

/// A callable exposed to the model.
pub trait Tool {
    /// Declaration sent to the model: name, description and input schema.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool with the raw JSON arguments from the model.
    fn invoke(&self, arguments: &str) -> ToolReply;
}

/// Dispatches tool calls by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Invokes the tool named by `call`. Unknown names produce an error
    /// reply rather than a fault.
    #[instrument(level = "info", skip_all, fields(tool = %call.name, id = %call.id))]
    pub fn dispatch(&self, call: &ToolCall) -> ToolReply {
        match self
            .tools
            .iter()
            .find(|tool| tool.definition().name == call.name)
        {
            Some(tool) => tool.invoke(&call.arguments),
            None => {
                warn!("model requested an unknown tool");
                ToolReply::error(format!("Error: unknown tool '{}'", call.name))
            }
        }
    }
}

/// Arguments accepted by [`WORKING_PAPER_TOOL`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkingPaperArgs {
    pub adjustments: Vec<Adjustment>,
    #[serde(rename = "currentTB")]
    pub current_tb: Vec<TrialBalanceRow>,
    #[serde(rename = "priorTB", default)]
    pub prior_tb: Option<Vec<TrialBalanceRow>>,
    pub current_year: Label,
    pub last_year: Label,
    #[serde(default)]
    pub output_path: Option<String>,
}

/// A period label such as a tax year. Models sometimes send bare numbers,
/// so both forms are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Text(String),
    Number(serde_json::Number),
}

impl Label {
    fn into_text(self) -> String {
        match self {
            Label::Text(text) => text.trim().to_string(),
            Label::Number(number) => number.to_string(),
        }
    }
}

impl WorkingPaperArgs {
    /// Validates the arguments and fills in defaults.
    pub fn into_request(self, default_output_dir: &Path) -> Result<WorkingPaperRequest> {
        let current_year = self.current_year.into_text();
        let last_year = self.last_year.into_text();
        if current_year.is_empty() {
            return Err(AssistantError::invalid_arguments(
                WORKING_PAPER_TOOL,
                "currentYear must not be blank",
            ));
        }
        if last_year.is_empty() {
            return Err(AssistantError::invalid_arguments(
                WORKING_PAPER_TOOL,
                "lastYear must not be blank",
            ));
        }

        let output_path = self
            .output_path
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_dir.to_path_buf());

        Ok(WorkingPaperRequest {
            adjustments: self.adjustments,
            current_tb: self.current_tb,
            prior_tb: self.prior_tb.unwrap_or_default(),
            current_year,
            last_year,
            output_path,
        })
    }
}

/// Exposes the working paper writer to the agent.
#[derive(Debug, Clone)]
pub struct WorkingPaperTool {
    default_output_dir: PathBuf,
}

impl Default for WorkingPaperTool {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl WorkingPaperTool {
    pub fn new(default_output_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_output_dir: default_output_dir.into(),
        }
    }

    /// Parses and validates a raw payload into a writer request.
    pub fn parse_request(&self, arguments: &str) -> Result<WorkingPaperRequest> {
        let args: WorkingPaperArgs = serde_json::from_str(arguments)
            .map_err(|e| AssistantError::invalid_arguments(WORKING_PAPER_TOOL, e.to_string()))?;
        args.into_request(&self.default_output_dir)
    }

    /// Runs the writer for a raw payload. Schema faults come back as `Err`,
    /// writer failures as [`WorkingPaperResult::Failure`].
    pub fn call(&self, arguments: &str) -> Result<WorkingPaperResult> {
        let request = self.parse_request(arguments)?;
        debug!(
            current_rows = request.current_tb.len(),
            prior_rows = request.prior_tb.len(),
            adjustments = request.adjustments.len(),
            "validated working paper request"
        );
        Ok(workpaper::generate_working_paper(&request))
    }
}

impl Tool for WorkingPaperTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            WORKING_PAPER_TOOL,
            "Generate the Schedule M-1 working paper as an Excel workbook. Writes the \
             current-year trial balance, the prior-year trial balance when provided, and the \
             proposed M-1 adjustments to m1_working_paper.xlsx in the output directory.",
        )
        .with_parameters(working_paper_schema(&self.default_output_dir))
    }

    fn invoke(&self, arguments: &str) -> ToolReply {
        match self.call(arguments) {
            Ok(result) => ToolReply {
                content: result.to_json().to_string(),
                is_error: !result.is_success(),
                artifacts: result.output_file_path().map(PathBuf::from).into_iter().collect(),
            },
            Err(error) => {
                warn!(%error, "rejected working paper payload");
                ToolReply::error(format!("Error: {error}"))
            }
        }
    }
}

fn working_paper_schema(default_output_dir: &Path) -> Value {
    let trial_balance = json!({
        "type": "array",
        "items": {
            "type": "object",
            "description": "One account line; keys are the trial balance column names.",
            "additionalProperties": {"type": ["string", "number", "boolean", "null"]}
        }
    });

    json!({
        "type": "object",
        "properties": {
            "adjustments": {
                "type": "array",
                "description": "Proposed Schedule M-1 adjustments, in presentation order.",
                "items": {
                    "type": "object",
                    "properties": {
                        "account": {"type": "string", "description": "Trial balance account the adjustment relates to."},
                        "type": {"type": "string", "enum": ["Permanent", "Temporary"]},
                        "amount": {"type": "number", "description": "Adjustment amount in dollars."},
                        "explanation": {"type": "string"},
                        "irs_rule_ref": {"type": "string", "description": "IRC section or regulation supporting the adjustment."},
                        "m1_line": {"type": "string", "description": "Schedule M-1 line the adjustment is reported on."}
                    },
                    "required": ["account", "type", "amount", "explanation"],
                    "additionalProperties": false
                }
            },
            "currentTB": trial_balance.clone(),
            "priorTB": trial_balance,
            "currentYear": {"type": "string", "description": "Label of the current tax year, e.g. 2023."},
            "lastYear": {"type": "string", "description": "Label of the prior tax year, e.g. 2022."},
            "outputPath": {
                "type": "string",
                "description": format!(
                    "Directory to write the workbook into. Defaults to {}.",
                    default_output_dir.display()
                )
            }
        },
        "required": ["adjustments", "currentTB", "currentYear", "lastYear"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxprep::m1::model::AdjustmentType;

    fn payload() -> Value {
        json!({
            "adjustments": [
                {"account": "Meals", "type": "permanent", "amount": 500, "explanation": "50% disallowed"}
            ],
            "currentTB": [{"Account": "Cash", "Balance": 1000}],
            "currentYear": 2023,
            "lastYear": "2022"
        })
    }

    #[test]
    fn schema_declares_required_fields() {
        let definition = WorkingPaperTool::default().definition();
        assert_eq!(definition.name, WORKING_PAPER_TOOL);
        assert_eq!(
            definition.parameters["required"],
            json!(["adjustments", "currentTB", "currentYear", "lastYear"])
        );
        assert_eq!(
            definition.parameters["properties"]["adjustments"]["items"]["properties"]["type"]["enum"],
            json!(["Permanent", "Temporary"])
        );
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let tool = WorkingPaperTool::new("reports");
        let request = tool.parse_request(&payload().to_string()).unwrap();
        assert_eq!(request.current_year, "2023");
        assert!(request.prior_tb.is_empty());
        assert_eq!(request.output_path, PathBuf::from("reports"));
        assert_eq!(request.adjustments[0].kind, AdjustmentType::Permanent);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let mut payload = payload();
        payload.as_object_mut().unwrap().remove("currentTB");
        let reply = WorkingPaperTool::default().invoke(&payload.to_string());
        assert!(reply.is_error);
        assert!(reply.content.contains(WORKING_PAPER_TOOL));
        assert!(reply.content.contains("currentTB"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut payload = payload();
        payload["fiscalYearEnd"] = json!("12-31");
        let err = WorkingPaperTool::default()
            .parse_request(&payload.to_string())
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidToolArguments { .. }));
    }

    #[test]
    fn blank_year_label_is_rejected() {
        let mut payload = payload();
        payload["lastYear"] = json!("  ");
        assert!(
            WorkingPaperTool::default()
                .parse_request(&payload.to_string())
                .is_err()
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        let reply = WorkingPaperTool::default().invoke("{not json");
        assert!(reply.is_error);
        assert!(reply.content.starts_with("Error: invalid arguments"));
    }

    #[test]
    fn registry_reports_unknown_tools() {
        let registry = ToolRegistry::new().register(WorkingPaperTool::default());
        let reply = registry.dispatch(&ToolCall {
            id: "toolu_1".into(),
            name: "delete_everything".into(),
            arguments: "{}".into(),
        });
        assert!(reply.is_error);
        assert_eq!(registry.definitions().len(), 1);
    }
}
