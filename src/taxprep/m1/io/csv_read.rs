use std::io::Read;

use csv::Trim;

use crate::taxprep::m1::error::Result;
use crate::taxprep::m1::io::unique_headers;
use crate::taxprep::m1::model::{CellValue, TrialBalanceRow};

/// Reads a trial balance from a CSV stream.
///
/// The header row names the columns. Fields are trimmed, blank lines are
/// skipped and short rows are tolerated: cells a row does not reach are
/// blank. A repeated header gets a numeric suffix.
///
/// ```csv
/// Account,        Debit,   Credit
/// Cash,           1000,
/// Meals,          500,
/// ```
pub fn read_trial_balance<R: Read>(reader: R) -> Result<Vec<TrialBalanceRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = unique_headers(csv_reader.headers()?.iter());
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let mut row = TrialBalanceRow::new();
        for (col_idx, header) in headers.iter().enumerate() {
            let Some(header) = header else {
                continue;
            };
            let value = record.get(col_idx).map(CellValue::infer).unwrap_or(CellValue::Blank);
            row.insert(header.as_str(), value);
        }
        rows.push(row);
    }

    Ok(rows)
}
