//! Best-effort reading of `.xls`, `.xlsb` and `.ods` workbooks through
//! calamine. Only values are available: every cell gets the default format
//! and columns keep their default width.

use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::style::CellStyle;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::Workbook;
use calamine::open_workbook_auto;
use calamine::Data;
use calamine::Reader;
use calamine::Sheets;
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub(crate) struct LegacyWorkbook {
    name: String,
    sheets: Sheets<BufReader<File>>,
}

impl LegacyWorkbook {
    pub(crate) fn open(path: &Path) -> Result<LegacyWorkbook, SpreadsheetError> {
        let name = path.display().to_string();
        let sheets = open_workbook_auto(path)?;
        if sheets.sheet_names().is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(name.to_owned()))?
        }
        Ok(LegacyWorkbook { name, sheets })
    }
}

impl Workbook for LegacyWorkbook {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SpreadsheetError> {
        if !self.sheets.sheet_names().iter().any(|name| name == sheet_name) {
            Err(SpreadsheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned()))?
        }

        let range = self.sheets.worksheet_range(sheet_name)?;
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut sheet = Sheet::new(&self.name, sheet_name, vec![CellStyle::default()]);
        for (row, col, data) in range.used_cells() {
            sheet.push(
                row_offset as usize + row,
                col_offset as usize + col,
                Cell::new(to_cell_value(data), 0),
            );
        }
        debug!("Read {} cells from sheet '{}' of '{}'", sheet.cells.len(), sheet_name, self.name);
        Ok(sheet)
    }
}

fn to_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Blank,
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::String(value) => CellValue::Text(value.to_owned()),
        Data::Bool(value) => CellValue::Boolean(*value),
        Data::DateTime(value) => value
            .as_datetime()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(value.as_f64())),
        Data::DateTimeIso(value) => parse_iso_datetime(value)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(value.to_owned())),
        Data::DurationIso(value) => CellValue::Text(value.to_owned()),
        Data::Error(error) => CellValue::Error(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    #[test]
    fn converts_calamine_values() {
        assert_eq!(to_cell_value(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(to_cell_value(&Data::String("x".to_owned())), CellValue::Text("x".to_owned()));
        assert_eq!(to_cell_value(&Data::Bool(true)), CellValue::Boolean(true));
        assert_eq!(to_cell_value(&Data::Empty), CellValue::Blank);
        assert_eq!(to_cell_value(&Data::Error(CellErrorType::NA)), CellValue::Error("#N/A".to_owned()));
        assert!(matches!(
            to_cell_value(&Data::DateTimeIso("2024-05-01".to_owned())),
            CellValue::DateTime(_)
        ));
    }
}
