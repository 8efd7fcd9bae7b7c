use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};

use crate::taxprep::m1::error::Result;
use crate::taxprep::m1::model::CellValue;
use crate::taxprep::m1::workpaper::WorkbookData;

/// Number format applied to monetary columns.
pub const AMOUNT_FORMAT: &str = "#,##0.00";

/// Writes the provided workbook data to the given path, replacing any file
/// already there.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut workbook_writer = Workbook::new();
    let header_format = Format::new().set_bold();
    let amount_format = Format::new().set_num_format(AMOUNT_FORMAT);

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&table.sheet_name)?;

        if table.columns.is_empty() {
            continue;
        }

        for (col_idx, header) in table.columns.iter().enumerate() {
            worksheet.write_string_with_format(0, col_idx as u16, header, &header_format)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            let row_num = (row_idx + 1) as u32;
            for (col_idx, cell) in row.iter().enumerate() {
                let col_num = col_idx as u16;
                match cell {
                    CellValue::Blank => {}
                    CellValue::Text(value) => {
                        worksheet.write_string(row_num, col_num, value)?;
                    }
                    CellValue::Number(value) if table.amount_columns.contains(&col_idx) => {
                        worksheet.write_number_with_format(row_num, col_num, *value, &amount_format)?;
                    }
                    CellValue::Number(value) => {
                        worksheet.write_number(row_num, col_num, *value)?;
                    }
                    CellValue::Boolean(value) => {
                        worksheet.write_boolean(row_num, col_num, *value)?;
                    }
                }
            }
        }

        let col_end = (table.columns.len() as u16).saturating_sub(1);
        worksheet.autofilter(0, 0, table.rows.len() as u32, col_end)?;
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();
    }

    workbook_writer.save(path)?;
    Ok(())
}
