use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A single typed cell as it will be rendered in the working paper.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell.
    Blank,
    /// Plain text.
    Text(String),
    /// Numeric value, written as a number rather than text.
    Number(f64),
    /// Boolean literal.
    Boolean(bool),
}

impl CellValue {
    /// Interprets a raw text field the way the trial balance loaders do:
    /// blanks stay blank, numeric-looking values become numbers.
    ///
    /// Codes such as `0100` or identifiers longer than an `f64` can carry
    /// exactly stay text, so account numbers reach the sheet unchanged.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Blank;
        }
        match parse_number(trimmed).filter(|_| is_exact_number(trimmed)) {
            Some(number) => CellValue::Number(number),
            None => CellValue::Text(trimmed.to_string()),
        }
    }

    /// Converts the cell into its JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Blank => Value::Null,
            CellValue::Text(value) => Value::String(value.clone()),
            CellValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Boolean(value) => Value::Bool(*value),
        }
    }
}

/// One account line of a trial balance.
///
/// The column set is open-ended and follows whatever header the source file
/// carried. Column order is the insertion order, so the first row of a file
/// determines the natural column layout of the rendered sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct TrialBalanceRow {
    cells: Map<String, Value>,
}

impl TrialBalanceRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the value stored under `column`.
    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.insert(column.into(), value.to_json());
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Returns the typed cell for `column`, or [`CellValue::Blank`] when the
    /// row does not carry that column.
    pub fn cell(&self, column: &str) -> CellValue {
        match self.cells.get(column) {
            Some(Value::String(value)) => CellValue::Text(value.clone()),
            Some(Value::Number(number)) => number
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or(CellValue::Blank),
            Some(Value::Bool(value)) => CellValue::Boolean(*value),
            _ => CellValue::Blank,
        }
    }
}

impl TryFrom<Map<String, Value>> for TrialBalanceRow {
    type Error = String;

    fn try_from(cells: Map<String, Value>) -> Result<Self, Self::Error> {
        if let Some((column, _)) = cells
            .iter()
            .find(|(_, value)| value.is_array() || value.is_object())
        {
            return Err(format!(
                "trial balance column '{column}' must hold a string or number"
            ));
        }
        Ok(Self { cells })
    }
}

impl From<TrialBalanceRow> for Map<String, Value> {
    fn from(row: TrialBalanceRow) -> Self {
        row.cells
    }
}

/// Book-tax difference classification for Schedule M-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AdjustmentType {
    Permanent,
    Temporary,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Permanent => "Permanent",
            AdjustmentType::Temporary => "Temporary",
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "permanent" => Ok(AdjustmentType::Permanent),
            "temporary" => Ok(AdjustmentType::Temporary),
            _ => Err(format!(
                "adjustment type '{raw}' is not one of Permanent, Temporary"
            )),
        }
    }
}

impl TryFrom<String> for AdjustmentType {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<AdjustmentType> for String {
    fn from(kind: AdjustmentType) -> Self {
        kind.as_str().to_string()
    }
}

/// A proposed book-to-tax adjustment. These are produced by the model and
/// passed through untouched apart from type and amount coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Adjustment {
    pub account: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: f64,
    pub explanation: String,
    #[serde(
        default,
        alias = "irsRuleRef",
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub irs_rule_ref: Option<String>,
    #[serde(
        default,
        alias = "m1Line",
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub m1_line: Option<String>,
}

impl Adjustment {
    pub fn new(
        account: impl Into<String>,
        kind: AdjustmentType,
        amount: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            kind,
            amount,
            explanation: explanation.into(),
            irs_rule_ref: None,
            m1_line: None,
        }
    }

    pub fn with_irs_rule_ref(mut self, reference: impl Into<String>) -> Self {
        self.irs_rule_ref = Some(reference.into());
        self
    }

    pub fn with_m1_line(mut self, line: impl Into<String>) -> Self {
        self.m1_line = Some(line.into());
        self
    }
}

/// Everything needed to render one working paper.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingPaperRequest {
    pub adjustments: Vec<Adjustment>,
    pub current_tb: Vec<TrialBalanceRow>,
    pub prior_tb: Vec<TrialBalanceRow>,
    pub current_year: String,
    pub last_year: String,
    /// Directory the workbook is written into.
    pub output_path: PathBuf,
}

/// Outcome of a working paper generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkingPaperResult {
    Success { output_file_path: PathBuf },
    Failure { message: String },
}

impl WorkingPaperResult {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkingPaperResult::Success { .. })
    }

    pub fn output_file_path(&self) -> Option<&Path> {
        match self {
            WorkingPaperResult::Success { output_file_path } => Some(output_file_path),
            WorkingPaperResult::Failure { .. } => None,
        }
    }

    /// Converts the result into the JSON payload relayed back to the agent.
    pub fn to_json(&self) -> Value {
        match self {
            WorkingPaperResult::Success { output_file_path } => serde_json::json!({
                "success": true,
                "outputFilePath": output_file_path.display().to_string(),
            }),
            WorkingPaperResult::Failure { message } => serde_json::json!({
                "success": false,
                "error": message,
            }),
        }
    }
}

/// Parses accounting-style numbers: thousands separators, a leading currency
/// sign and parenthesised negatives are accepted.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => (true, inner.trim()),
        None => (false, trimmed),
    };
    let body = body.strip_prefix('$').unwrap_or(body);
    let cleaned: String = body.chars().filter(|ch| *ch != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Digits an `f64` always round-trips.
const MAX_EXACT_DIGITS: usize = 15;

/// True when `raw` reads back identically once stored as an `f64`: no
/// leading zero ahead of another digit and at most fifteen significant
/// digits.
fn is_exact_number(raw: &str) -> bool {
    let body = raw.trim_start_matches(['(', '-', '+', '$', ' ']);
    let mantissa = body.split(['e', 'E']).next().unwrap_or(body);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let integer_part: String = mantissa
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    if integer_part.len() > 1 && integer_part.starts_with('0') {
        return false;
    }
    digits.trim_start_matches('0').trim_end_matches('0').len() <= MAX_EXACT_DIGITS
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount is out of range")),
        Value::String(raw) => parse_number(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("amount '{raw}' is not a number"))),
        other => Err(serde::de::Error::custom(format!(
            "amount must be a number, found {other}"
        ))),
    }
}

fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty()))
}
