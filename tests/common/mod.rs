#![allow(dead_code)]

use rust_xlsxwriter::Color;
use rust_xlsxwriter::Format;
use rust_xlsxwriter::FormatBorder;
use rust_xlsxwriter::FormatPattern;
use rust_xlsxwriter::Workbook;
use rust_xlsxwriter::Worksheet;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;
use tempfile::tempdir;

/// 2024-01-15 in the 1900 date system
pub const JAN_15_2024: f64 = 45306.0;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Builds a workbook under the workspace and returns its path.
    pub fn workbook(&self, name: &str, build: impl FnOnce(&mut Workbook)) -> PathBuf {
        let path = self.join(name);
        let mut workbook = Workbook::new();
        build(&mut workbook);
        workbook.save(&path).expect("save fixture workbook");
        path
    }

    /// A one-sheet workbook with a plain text header row and the given rows.
    pub fn table(&self, name: &str, headers: &[&str], rows: &[Vec<Value>]) -> PathBuf {
        self.workbook(name, |workbook| {
            let worksheet = workbook.add_worksheet();
            write_rows(worksheet, headers, rows);
        })
    }

    /// Names of the files left in the workspace, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names = std::fs::read_dir(self.path())
            .expect("list workspace")
            .map(|entry| entry.expect("workspace entry").file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// A fixture cell value.
#[derive(Clone, Debug)]
pub enum Value {
    Text(&'static str),
    Number(f64),
    Blank,
}

pub fn write_rows(worksheet: &mut Worksheet, headers: &[&str], rows: &[Vec<Value>]) {
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header).expect("write header");
    }
    for (row, values) in rows.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            let (row, col) = (row as u32 + 1, col as u16);
            match value {
                Value::Text(text) => {
                    worksheet.write_string(row, col, *text).expect("write text");
                }
                Value::Number(number) => {
                    worksheet.write_number(row, col, *number).expect("write number");
                }
                Value::Blank => (),
            }
        }
    }
}

/// A formatted sheet: bold filled headers, bordered two-decimal amounts,
/// dates, booleans, a wide name column and an italic blank cell.
pub fn write_formatted_sheet(worksheet: &mut Worksheet) {
    let header = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0xFFFFFF))
        .set_pattern(FormatPattern::Solid)
        .set_background_color(Color::RGB(0x1F4E79));
    let amount = Format::new()
        .set_num_format("0.00")
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0x808080));
    let date = Format::new().set_num_format("yyyy-mm-dd");
    let note = Format::new().set_italic().set_text_wrap();

    for (col, name) in ["id", "name", "amount", "due", "paid", "note"].iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header).expect("write header");
    }
    worksheet.set_column_width(1, 24).expect("set width");

    let rows = [(1.0, "Ada", 12.5, 0.0, true, Some("first")), (2.0, "Grace", 7.25, 31.0, false, None)];
    for (index, (id, name, total, offset, paid, text)) in rows.iter().enumerate() {
        let row = index as u32 + 1;
        worksheet.write_number(row, 0, *id).expect("write id");
        worksheet.write_string(row, 1, *name).expect("write name");
        worksheet.write_number_with_format(row, 2, *total, &amount).expect("write amount");
        worksheet
            .write_number_with_format(row, 3, JAN_15_2024 + offset, &date)
            .expect("write date");
        worksheet.write_boolean(row, 4, *paid).expect("write flag");
        match text {
            Some(text) => worksheet.write_string_with_format(row, 5, *text, &note).expect("write note"),
            None => worksheet.write_blank(row, 5, &note).expect("write blank"),
        };
    }
}
