//! Trial balance loaders and the workbook writer.

pub mod csv_read;
pub mod excel_read;
pub mod excel_write;

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{info, instrument, warn};

use crate::taxprep::m1::error::{AssistantError, Result};
use crate::taxprep::m1::model::TrialBalanceRow;

/// Loads a trial balance, picking the reader from the file extension.
///
/// A file that parses but carries no data rows is an error: nothing useful
/// can be asked of the model without account lines.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn load_trial_balance(path: &Path) -> Result<Vec<TrialBalanceRow>> {
    if !path.exists() {
        return Err(AssistantError::MissingInput(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let rows = match extension.as_deref() {
        Some("csv") => {
            let file = File::open(path)?;
            csv_read::read_trial_balance(BufReader::new(file))?
        }
        Some("xlsx") | Some("xlsm") => excel_read::read_trial_balance(path)?,
        _ => return Err(AssistantError::UnsupportedFormat(path.to_path_buf())),
    };

    if rows.is_empty() {
        return Err(AssistantError::EmptyDataset(path.to_path_buf()));
    }

    info!(row_count = rows.len(), "loaded trial balance");
    Ok(rows)
}

/// Turns a header row into distinct column names. Blank headers map to
/// `None` and their cells are dropped; a repeated header is renamed
/// `Name_1`, `Name_2`, ... so no column overwrites another.
pub(crate) fn unique_headers<'a>(
    headers: impl IntoIterator<Item = &'a str>,
) -> Vec<Option<String>> {
    let headers: Vec<&str> = headers.into_iter().map(str::trim).collect();
    let used: HashSet<&str> = headers.iter().copied().filter(|h| !h.is_empty()).collect();
    let mut seen = HashSet::new();
    let mut renamed = HashSet::new();

    headers
        .iter()
        .map(|header| {
            if header.is_empty() {
                return None;
            }
            if seen.insert(*header) {
                return Some(header.to_string());
            }

            let mut counter = 1;
            let candidate = loop {
                let candidate = format!("{header}_{counter}");
                if !used.contains(candidate.as_str()) && renamed.insert(candidate.clone()) {
                    break candidate;
                }
                counter += 1;
            };
            warn!(header = %header, column = %candidate, "renamed repeated column header");
            Some(candidate)
        })
        .collect()
}
