//! Schedule M-1 working paper generation.
//!
//! [`build_workbook`] lays the request out as sheet tables and
//! [`generate_working_paper`] writes them to
//! `<output_path>/m1_working_paper.xlsx`. The writer reports every failure
//! through [`WorkingPaperResult`] instead of returning an error, so an agent
//! calling it always receives a structured outcome.
//!
//! At most one generation per output directory is expected to run at a time;
//! nothing guards against two writers racing on the same file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::taxprep::m1::error::Result;
use crate::taxprep::m1::io::excel_write;
use crate::taxprep::m1::model::{
    Adjustment, CellValue, TrialBalanceRow, WorkingPaperRequest, WorkingPaperResult,
};

/// Fixed file name of the generated workbook.
pub const OUTPUT_FILE_NAME: &str = "m1_working_paper.xlsx";
/// Directory used when the caller does not name one.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";
/// Sheet name of the adjustment schedule.
pub const ADJUSTMENTS_SHEET: &str = "M-1 Adjustments";
/// Header of the adjustment schedule, in column order.
pub const ADJUSTMENT_COLUMNS: [&str; 7] = [
    "#",
    "Account",
    "Type",
    "Amount",
    "Explanation",
    "IRS Ref",
    "M-1 Line",
];
const AMOUNT_COLUMN: usize = 3;

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Indices of columns rendered with the monetary number format.
    pub amount_columns: Vec<usize>,
}

/// Represents all tables required to materialise the Excel workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

/// Name of the sheet holding a trial balance for the given period label.
pub fn trial_balance_sheet_name(period: &str) -> String {
    format!("{} TB", period.trim())
}

/// Lays out the working paper: current trial balance, prior trial balance
/// (only when rows were supplied) and the adjustment schedule.
pub fn build_workbook(request: &WorkingPaperRequest) -> WorkbookData {
    let mut sheet_names = SheetNameRegistry::default();
    sheet_names.claim(ADJUSTMENTS_SHEET.to_string());

    let mut tables = Vec::with_capacity(3);
    tables.push(trial_balance_table(
        sheet_names.assign(&trial_balance_sheet_name(&request.current_year)),
        &request.current_tb,
    ));

    if !request.prior_tb.is_empty() {
        tables.push(trial_balance_table(
            sheet_names.assign(&trial_balance_sheet_name(&request.last_year)),
            &request.prior_tb,
        ));
    }

    tables.push(adjustments_table(&request.adjustments));

    WorkbookData { tables }
}

/// Generates the working paper described by `request`.
///
/// A missing output directory is created. An existing workbook at the target
/// path is overwritten.
#[instrument(
    level = "info",
    skip_all,
    fields(output = %request.output_path.display(), adjustments = request.adjustments.len())
)]
pub fn generate_working_paper(request: &WorkingPaperRequest) -> WorkingPaperResult {
    match try_generate(request) {
        Ok(output_file_path) => {
            info!(path = %output_file_path.display(), "working paper written");
            WorkingPaperResult::Success { output_file_path }
        }
        Err(error) => {
            warn!(%error, "working paper generation failed");
            WorkingPaperResult::Failure {
                message: error.to_string(),
            }
        }
    }
}

fn try_generate(request: &WorkingPaperRequest) -> Result<PathBuf> {
    ensure_directory(&request.output_path)?;

    let output_file_path = request.output_path.join(OUTPUT_FILE_NAME);
    if output_file_path.exists() {
        // Earlier working papers are not versioned.
        warn!(path = %output_file_path.display(), "overwriting existing working paper");
    }

    let workbook = build_workbook(request);
    debug!(sheet_count = workbook.tables.len(), "workbook constructed");
    excel_write::write_workbook(&output_file_path, &workbook)?;
    Ok(output_file_path)
}

fn ensure_directory(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)?;
        info!(dir = %dir.display(), "created output directory");
    }
    Ok(())
}

fn trial_balance_table(sheet_name: String, rows: &[TrialBalanceRow]) -> SheetTable {
    let mut columns: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for row in rows {
        for column in row.columns() {
            if seen.insert(column) {
                columns.push(column.to_string());
            }
        }
    }

    let rows = rows
        .iter()
        .map(|row| columns.iter().map(|column| row.cell(column)).collect())
        .collect();

    SheetTable {
        sheet_name,
        columns,
        rows,
        amount_columns: Vec::new(),
    }
}

fn adjustments_table(adjustments: &[Adjustment]) -> SheetTable {
    let rows = adjustments
        .iter()
        .enumerate()
        .map(|(index, adjustment)| {
            vec![
                CellValue::Number((index + 1) as f64),
                CellValue::Text(adjustment.account.clone()),
                CellValue::Text(adjustment.kind.to_string()),
                CellValue::Number(adjustment.amount),
                CellValue::Text(adjustment.explanation.clone()),
                optional_text(adjustment.irs_rule_ref.as_deref()),
                optional_text(adjustment.m1_line.as_deref()),
            ]
        })
        .collect();

    SheetTable {
        sheet_name: ADJUSTMENTS_SHEET.to_string(),
        columns: ADJUSTMENT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
        amount_columns: vec![AMOUNT_COLUMN],
    }
}

fn optional_text(value: Option<&str>) -> CellValue {
    match value {
        Some(text) => CellValue::Text(text.to_string()),
        None => CellValue::Blank,
    }
}

#[derive(Debug, Default)]
struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    fn claim(&mut self, name: String) {
        self.used.insert(name.to_lowercase());
    }

    /// Excel compares sheet names case-insensitively.
    fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let max_len = 31 - suffix.len();
            let prefix: String = base.chars().take(max_len).collect();
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Excel limits sheet names to 31 characters and rejects a leading or
/// trailing apostrophe, so the cut happens before the trim.
fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']'];
    let truncated: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .take(31)
        .collect();

    let sanitized = truncated.trim_matches(|ch: char| ch == '\'' || ch.is_whitespace());
    if sanitized.is_empty() {
        "Sheet".to_string()
    } else {
        sanitized.to_string()
    }
}
