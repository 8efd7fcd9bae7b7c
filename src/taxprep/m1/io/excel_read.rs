use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};

use crate::taxprep::m1::error::{AssistantError, Result};
use crate::taxprep::m1::io::unique_headers;
use crate::taxprep::m1::model::{CellValue, TrialBalanceRow};

/// Lists the sheet names of a workbook in tab order.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook: Xlsx<_> = open_workbook(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Reads every row of the named sheet as display strings, header included.
pub fn read_sheet(path: &Path, name: &str) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = read_required_sheet(&mut workbook, name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell_to_string(Some(cell))).collect())
        .collect())
}

/// Reads a trial balance from the first worksheet of an `.xlsx` file. The
/// first row is the header, following the same conventions as the CSV
/// loader.
pub fn read_trial_balance(path: &Path) -> Result<Vec<TrialBalanceRow>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AssistantError::InvalidSheet("workbook has no sheets".into()))?;
    let range = read_required_sheet(&mut workbook, &first)?;

    let mut rows_iter = range.rows();
    let headers = match rows_iter.next() {
        Some(first_row) => {
            let labels: Vec<String> = first_row
                .iter()
                .map(|cell| cell_to_string(Some(cell)))
                .collect();
            unique_headers(labels.iter().map(String::as_str))
        }
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for row in rows_iter {
        if row.iter().all(|cell| matches!(cell, DataType::Empty)) {
            continue;
        }

        let mut record = TrialBalanceRow::new();
        for (col_idx, header) in headers.iter().enumerate() {
            let Some(header) = header else {
                continue;
            };
            record.insert(header.as_str(), cell_to_value(row.get(col_idx)));
        }
        rows.push(record);
    }

    Ok(rows)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| AssistantError::InvalidSheet(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(AssistantError::from)?;
    Ok(range)
}

fn cell_to_value(cell: Option<&DataType>) -> CellValue {
    match cell {
        Some(DataType::Float(value)) => CellValue::Number(*value),
        Some(DataType::Int(value)) => CellValue::Number(*value as f64),
        Some(DataType::Bool(value)) => CellValue::Boolean(*value),
        Some(DataType::String(value)) => CellValue::infer(value),
        Some(DataType::Empty) | None => CellValue::Blank,
        Some(other) => CellValue::Text(other.to_string()),
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
