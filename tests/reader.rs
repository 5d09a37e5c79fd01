mod common;

use chrono::NaiveDate;
use common::TestWorkspace;
use common::Value;
use common::write_formatted_sheet;
use common::write_rows;
use sheet_merge::DataWarning;
use sheet_merge::LoadOptions;
use sheet_merge::SourceTable;
use sheet_merge::inspect;
use sheet_merge::spreadsheet::cell::CellValue;
use sheet_merge::spreadsheet::style::Rgb;

fn load(path: &std::path::Path) -> SourceTable {
    SourceTable::load(path, &LoadOptions::default()).expect("load table")
}

#[test]
fn reads_values_of_every_type() {
    let workspace = TestWorkspace::new();
    let path = workspace.workbook("formatted.xlsx", |workbook| write_formatted_sheet(workbook.add_worksheet()));
    let table = load(&path);

    assert_eq!(table.column_names(), vec!["id", "name", "amount", "due", "paid", "note"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.first_data_row, 2);

    let first = &table.rows[0];
    assert_eq!(first[0].value, CellValue::Number(1.0));
    assert_eq!(first[1].value, CellValue::Text("Ada".to_string()));
    assert_eq!(first[2].value, CellValue::Number(12.5));
    let due = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap();
    assert_eq!(first[3].value, CellValue::DateTime(due));
    assert_eq!(first[4].value, CellValue::Boolean(true));
    assert_eq!(table.rows[1][4].value, CellValue::Boolean(false));
    assert!(table.rows[1][5].value.is_blank());
}

#[test]
fn reads_cell_formats_and_widths() {
    let workspace = TestWorkspace::new();
    let path = workspace.workbook("formatted.xlsx", |workbook| write_formatted_sheet(workbook.add_worksheet()));
    let table = load(&path);

    let header = table.style(&table.columns[0].header).expect("header style");
    assert!(header.font.bold);
    assert_eq!(header.font.color, Some(Rgb(0xFFFFFF)));
    assert_eq!(header.fill.pattern.as_deref(), Some("solid"));
    assert_eq!(header.fill.foreground, Some(Rgb(0x1F4E79)));

    let amount = table.style(&table.rows[0][2]).expect("amount style");
    assert_eq!(amount.num_format.as_deref(), Some("0.00"));
    assert_eq!(amount.border.left.style.as_deref(), Some("thin"));
    assert_eq!(amount.border.bottom.color, Some(Rgb(0x808080)));

    let note = table.style(&table.rows[1][5]).expect("note style");
    assert!(note.font.italic);
    assert!(note.alignment.wrap_text);

    assert_eq!(table.columns[1].width, Some(24.7109375));
    assert_eq!(table.columns[0].width, None);
}

#[test]
fn reads_the_active_sheet_unless_named() {
    let workspace = TestWorkspace::new();
    let path = workspace.workbook("sheets.xlsx", |workbook| {
        let first = workbook.add_worksheet().set_name("First").expect("name");
        write_rows(first, &["a"], &[vec![Value::Number(1.0)]]);
        let second = workbook.add_worksheet().set_name("Second").expect("name");
        write_rows(second, &["b"], &[vec![Value::Number(2.0)], vec![Value::Number(3.0)]]);
        second.set_active(true);
    });

    let table = load(&path);
    assert_eq!(table.sheet, "Second");
    assert_eq!(table.column_names(), vec!["b"]);

    let options = LoadOptions {
        sheet: Some("First".to_string()),
    };
    let table = SourceTable::load(&path, &options).expect("load first sheet");
    assert_eq!(table.column_names(), vec!["a"]);

    let info = inspect(&path, &LoadOptions::default()).expect("inspect");
    assert_eq!(info.sheets, vec!["First", "Second"]);
    assert_eq!(info.columns, vec![("A".to_string(), "b".to_string())]);
    assert_eq!(info.rows, 2);
}

#[test]
fn starts_the_table_at_the_first_used_cell() {
    let workspace = TestWorkspace::new();
    let path = workspace.workbook("offset.xlsx", |workbook| {
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(2, 1, "code").expect("write");
        worksheet.write_string(2, 3, "price").expect("write");
        worksheet.write_string(3, 1, "X1").expect("write");
        worksheet.write_number(4, 3, 9.5).expect("write");
    });
    let table = load(&path);

    assert_eq!(table.column_names(), vec!["code", "column2", "price"]);
    assert_eq!(table.columns[0].letter(), "B");
    assert_eq!(table.first_data_row, 4);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1][2].value, CellValue::Number(9.5));
    assert!(matches!(
        &table.warnings[0],
        DataWarning::BlankHeader { name, .. } if name == "column2"
    ));
}

#[test]
fn renames_repeated_headers() {
    let workspace = TestWorkspace::new();
    let path = workspace.table("repeat.xlsx", &["x", "x", "x"], &[vec![Value::Number(1.0)]]);
    let table = load(&path);
    assert_eq!(table.column_names(), vec!["x", "x_2", "x_3"]);
    assert_eq!(table.warnings.len(), 2);
}

#[test]
fn reports_unreadable_inputs() {
    let workspace = TestWorkspace::new();

    let missing = workspace.join("missing.xlsx");
    let error = SourceTable::load(&missing, &LoadOptions::default()).unwrap_err();
    assert!(error.to_string().contains("missing.xlsx"));

    let text = workspace.join("notes.txt");
    std::fs::write(&text, "not a spreadsheet").expect("write text file");
    let error = SourceTable::load(&text, &LoadOptions::default()).unwrap_err();
    assert!(error.to_string().starts_with("Cannot detect file format"));

    let path = workspace.table("data.xlsx", &["a"], &[]);
    let options = LoadOptions {
        sheet: Some("Nope".to_string()),
    };
    let error = SourceTable::load(&path, &options).unwrap_err();
    assert!(error.to_string().contains("Sheet 'Nope' not found"));

    let empty = workspace.workbook("empty.xlsx", |workbook| {
        workbook.add_worksheet();
    });
    let error = SourceTable::load(&empty, &LoadOptions::default()).unwrap_err();
    assert!(error.to_string().contains("is empty"));
}

#[test]
fn rejects_encrypted_workbooks() {
    let workspace = TestWorkspace::new();
    let path = workspace.join("locked.xlsx");
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.resize(512, 0);
    std::fs::write(&path, bytes).expect("write file");
    let error = SourceTable::load(&path, &LoadOptions::default()).unwrap_err();
    assert!(error.to_string().contains("password protected"));
}
