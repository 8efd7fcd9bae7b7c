use std::fs;
use std::path::Path;

use m1_assistant::io::{self, excel_read};
use m1_assistant::model::{
    Adjustment, AdjustmentType, CellValue, TrialBalanceRow, WorkingPaperRequest,
    WorkingPaperResult,
};
use m1_assistant::tool::{Tool, WorkingPaperTool};
use m1_assistant::workpaper::{
    ADJUSTMENT_COLUMNS, ADJUSTMENTS_SHEET, OUTPUT_FILE_NAME, generate_working_paper,
};
use tempfile::tempdir;

fn tb_row(account: &str, balance: f64) -> TrialBalanceRow {
    let mut row = TrialBalanceRow::new();
    row.insert("Account", CellValue::Text(account.to_string()));
    row.insert("Balance", CellValue::Number(balance));
    row
}

fn request(output_path: &Path) -> WorkingPaperRequest {
    WorkingPaperRequest {
        adjustments: vec![Adjustment::new(
            "Meals",
            AdjustmentType::Permanent,
            500.0,
            "50% disallowed",
        )],
        current_tb: vec![tb_row("Cash", 1000.0)],
        prior_tb: Vec::new(),
        current_year: "2023".to_string(),
        last_year: "2022".to_string(),
        output_path: output_path.to_path_buf(),
    }
}

fn written_path(result: &WorkingPaperResult) -> &Path {
    match result {
        WorkingPaperResult::Success { output_file_path } => output_file_path,
        WorkingPaperResult::Failure { message } => panic!("generation failed: {message}"),
    }
}

fn data_rows(path: &Path, sheet: &str) -> Vec<Vec<String>> {
    let rows = excel_read::read_sheet(path, sheet).expect("sheet read");
    rows.into_iter().skip(1).collect()
}

#[test]
fn meals_scenario_produces_two_sheets() {
    let temp_dir = tempdir().expect("temporary directory");
    let output = temp_dir.path().join("output");
    let result = generate_working_paper(&request(&output));

    let path = written_path(&result);
    assert_eq!(path, output.join(OUTPUT_FILE_NAME));

    let sheets = excel_read::sheet_names(path).expect("sheet names");
    assert_eq!(sheets, vec!["2023 TB".to_string(), ADJUSTMENTS_SHEET.to_string()]);
    assert_eq!(data_rows(path, "2023 TB").len(), 1);

    let adjustments = excel_read::read_sheet(path, ADJUSTMENTS_SHEET).expect("adjustments");
    assert_eq!(adjustments[0], ADJUSTMENT_COLUMNS.map(str::to_string).to_vec());
    assert_eq!(
        adjustments[1],
        vec!["1", "Meals", "Permanent", "500", "50% disallowed", "", ""]
    );
}

#[test]
fn prior_trial_balance_gets_its_own_sheet() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut request = request(temp_dir.path());
    request.current_tb.push(tb_row("Meals", 1000.0));
    request.prior_tb = vec![tb_row("Cash", 800.0), tb_row("Meals", 600.0), tb_row("Fines", 50.0)];

    let result = generate_working_paper(&request);
    let path = written_path(&result);

    let sheets = excel_read::sheet_names(path).expect("sheet names");
    assert_eq!(sheets, vec!["2023 TB", "2022 TB", ADJUSTMENTS_SHEET]);
    assert_eq!(data_rows(path, "2023 TB").len(), 2);
    assert_eq!(data_rows(path, "2022 TB").len(), 3);
}

#[test]
fn adjustments_round_trip_in_order() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut request = request(temp_dir.path());
    request.adjustments = vec![
        Adjustment::new("Depreciation", AdjustmentType::Temporary, 12500.75, "MACRS exceeds book")
            .with_irs_rule_ref("IRC §168")
            .with_m1_line("Line 5a"),
        Adjustment::new("Fines", AdjustmentType::Permanent, 2000.0, "Nondeductible penalty")
            .with_irs_rule_ref("IRC §162(f)"),
        Adjustment::new("Municipal interest", AdjustmentType::Permanent, -350.0, "Tax-exempt"),
    ];

    let result = generate_working_paper(&request);
    let rows = data_rows(written_path(&result), ADJUSTMENTS_SHEET);

    assert_eq!(rows.len(), request.adjustments.len());
    for (index, (row, adjustment)) in rows.iter().zip(&request.adjustments).enumerate() {
        assert_eq!(row[0], (index + 1).to_string());
        assert_eq!(row[1], adjustment.account);
        assert_eq!(row[2], adjustment.kind.to_string());
        assert_eq!(row[3].parse::<f64>().expect("numeric amount"), adjustment.amount);
        assert_eq!(row[4], adjustment.explanation);
        assert_eq!(row[5], adjustment.irs_rule_ref.clone().unwrap_or_default());
        assert_eq!(row[6], adjustment.m1_line.clone().unwrap_or_default());
    }
}

#[test]
fn empty_adjustments_leave_header_only() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut request = request(temp_dir.path());
    request.adjustments.clear();

    let result = generate_working_paper(&request);
    let rows = excel_read::read_sheet(written_path(&result), ADJUSTMENTS_SHEET).expect("sheet");
    assert_eq!(rows.len(), 1);
}

#[test]
fn empty_current_trial_balance_still_writes() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut request = request(temp_dir.path());
    request.current_tb.clear();

    let result = generate_working_paper(&request);
    let path = written_path(&result);
    assert!(excel_read::sheet_names(path).expect("sheets").contains(&"2023 TB".to_string()));
    assert!(data_rows(path, "2023 TB").is_empty());
}

#[test]
fn nested_output_directory_is_created() {
    let temp_dir = tempdir().expect("temporary directory");
    let output = temp_dir.path().join("clients").join("acme").join("2023");
    assert!(!output.exists());

    let result = generate_working_paper(&request(&output));

    assert!(result.is_success());
    assert!(output.join(OUTPUT_FILE_NAME).is_file());
}

#[test]
fn existing_working_paper_is_overwritten() {
    let temp_dir = tempdir().expect("temporary directory");
    let target = temp_dir.path().join(OUTPUT_FILE_NAME);
    fs::write(&target, b"stale").expect("stale file written");

    let result = generate_working_paper(&request(temp_dir.path()));

    assert!(result.is_success());
    assert_eq!(data_rows(&target, ADJUSTMENTS_SHEET).len(), 1);
}

#[test]
fn output_path_blocked_by_file_reports_failure() {
    let temp_dir = tempdir().expect("temporary directory");
    let blocker = temp_dir.path().join("not-a-directory");
    fs::write(&blocker, b"").expect("blocker written");

    let result = generate_working_paper(&request(&blocker));

    match result {
        WorkingPaperResult::Failure { message } => assert!(!message.is_empty()),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn serialization_fault_reports_failure() {
    let temp_dir = tempdir().expect("temporary directory");
    fs::create_dir(temp_dir.path().join(OUTPUT_FILE_NAME)).expect("directory in the way");

    let result = generate_working_paper(&request(temp_dir.path()));

    assert!(!result.is_success());
    assert_eq!(result.to_json()["success"], serde_json::json!(false));
}

#[test]
fn tool_invocation_writes_csv_trial_balances() {
    let temp_dir = tempdir().expect("temporary directory");
    let current_csv = temp_dir.path().join("tb_2023.csv");
    let prior_csv = temp_dir.path().join("tb_2022.csv");
    fs::write(&current_csv, "Account,Debit,Credit\nCash,1000,\nMeals,500,\nRevenue,,1500\n")
        .expect("current written");
    fs::write(&prior_csv, "Account,Debit,Credit\nCash,900,\nRevenue,,900\n")
        .expect("prior written");

    let current = io::load_trial_balance(&current_csv).expect("current loaded");
    let prior = io::load_trial_balance(&prior_csv).expect("prior loaded");
    let output = temp_dir.path().join("papers");

    let payload = serde_json::json!({
        "adjustments": [
            {"account": "Meals", "type": "Permanent", "amount": 250,
             "explanation": "50% of meals disallowed", "irs_rule_ref": "IRC §274(n)",
             "m1_line": "Line 5c"}
        ],
        "currentTB": current,
        "priorTB": prior,
        "currentYear": "2023",
        "lastYear": "2022",
        "outputPath": output.display().to_string()
    });

    let reply = WorkingPaperTool::default().invoke(&payload.to_string());

    assert!(!reply.is_error, "tool failed: {}", reply.content);
    let relayed: serde_json::Value = serde_json::from_str(&reply.content).expect("JSON reply");
    assert_eq!(relayed["success"], serde_json::json!(true));
    let path = output.join(OUTPUT_FILE_NAME);
    assert_eq!(relayed["outputFilePath"], serde_json::json!(path.display().to_string()));
    assert_eq!(reply.artifacts, vec![path.clone()]);

    let current_sheet = excel_read::read_sheet(&path, "2023 TB").expect("current sheet");
    assert_eq!(current_sheet[0], vec!["Account", "Debit", "Credit"]);
    assert_eq!(current_sheet.len(), 4);
    assert_eq!(data_rows(&path, "2022 TB").len(), 2);
    assert_eq!(data_rows(&path, ADJUSTMENTS_SHEET)[0][5], "IRC §274(n)");
}

#[test]
fn xlsx_trial_balance_loads_from_first_sheet() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut request = request(temp_dir.path());
    request.current_tb.push(tb_row("Meals", 500.0));

    let result = generate_working_paper(&request);
    let rows = io::load_trial_balance(written_path(&result)).expect("xlsx loaded");

    assert_eq!(rows, request.current_tb);
}

#[test]
fn account_codes_survive_into_the_trial_balance_sheet() {
    let temp_dir = tempdir().expect("temporary directory");
    let csv_path = temp_dir.path().join("tb_2023.csv");
    fs::write(
        &csv_path,
        "Account No,Account,Amount,Amount\n0100,Cash,1000,10\n00123456789012345678,Loan,5,20\n",
    )
    .expect("csv written");

    let mut request = request(temp_dir.path());
    request.current_tb = io::load_trial_balance(&csv_path).expect("csv loaded");
    let result = generate_working_paper(&request);
    let path = written_path(&result);

    let sheet = excel_read::read_sheet(path, "2023 TB").expect("current sheet");
    assert_eq!(sheet[0], vec!["Account No", "Account", "Amount", "Amount_1"]);
    assert_eq!(sheet[1], vec!["0100", "Cash", "1000", "10"]);
    assert_eq!(sheet[2], vec!["00123456789012345678", "Loan", "5", "20"]);
}

#[test]
fn long_period_label_with_apostrophe_still_writes() {
    let temp_dir = tempdir().expect("temporary directory");
    let mut request = request(temp_dir.path());
    request.current_year = format!("{}'x", "a".repeat(30));

    let result = generate_working_paper(&request);
    let path = written_path(&result);

    let sheets = excel_read::sheet_names(path).expect("sheet names");
    assert_eq!(sheets[0], "a".repeat(30));
}
