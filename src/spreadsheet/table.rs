use crate::error::ResultMessage;
use crate::report::DataWarning;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::open_workbook;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::style::CellStyle;
use crate::spreadsheet::SpreadsheetError;
use log::info;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

/// Options for reading a source table.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// Sheet to read; the workbook's active sheet when `None`
    pub sheet: Option<String>,
}

/// A column of a source table.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// Unique name within the table
    pub name: String,
    /// 0-based column index in the source sheet
    pub index: usize,
    /// Width in file units (characters plus cell padding), if configured
    pub width: Option<f64>,
    /// The header cell the name was taken from
    pub header: Cell,
}

impl Column {
    /// Column letters in the source sheet, such as `"C"`.
    pub fn letter(&self) -> String {
        index_to_col(self.index)
    }

    /// Whether the name is the header value itself, not a generated or
    /// suffixed one.
    pub fn is_named_by_header(&self) -> bool {
        !self.header.value.is_blank() && self.header.value.to_string() == self.name
    }
}

/// One sheet of an input workbook: a header row of column names and the
/// data rows below it.
///
/// Every row holds exactly one cell per column. Cell styles index into
/// `styles`.
#[derive(Clone, Debug)]
pub struct SourceTable {
    pub path: PathBuf,
    pub sheet: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
    pub styles: Vec<CellStyle>,
    /// 1-based sheet row number of the first data row
    pub first_data_row: usize,
    /// Problems found in the header row
    pub warnings: Vec<DataWarning>,
}

impl SourceTable {
    /// Reads a sheet of a workbook.
    ///
    /// The header row is the first row holding a value; the columns span the
    /// sheet's used range.
    pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<SourceTable, SpreadsheetError> {
        let path = path.as_ref();
        let (_, table) = read_table(path, options).with_prefix(&format!("Read '{}'", path.display()))?;
        info!(
            "Loaded '{}' sheet '{}': {} columns, {} rows",
            table.file_name(),
            table.sheet,
            table.columns.len(),
            table.rows.len()
        );
        Ok(table)
    }

    /// Builds a table from plain values, with default formatting.
    ///
    /// Rows are padded or cut to the number of headers. Headers follow the
    /// same naming rules as loaded sheets.
    pub fn from_values(
        path: impl Into<PathBuf>,
        sheet: &str,
        headers: &[&str],
        rows: Vec<Vec<CellValue>>,
    ) -> SourceTable {
        let path = path.into();
        let header_cells = headers
            .iter()
            .map(|header| Cell::new(CellValue::Text((*header).to_owned()), 0))
            .collect::<Vec<_>>();
        let widths = vec![None; header_cells.len()];
        let (columns, warnings) = name_columns(&path.display().to_string(), 0, header_cells, widths);
        let rows = rows
            .into_iter()
            .map(|values| {
                let mut row = values.into_iter().map(|value| Cell::new(value, 0)).collect::<Vec<_>>();
                row.resize(columns.len(), Cell::default());
                row
            })
            .collect();
        SourceTable {
            path,
            sheet: sheet.to_owned(),
            columns,
            rows,
            styles: vec![CellStyle::default()],
            first_data_row: 2,
            warnings,
        }
    }

    fn from_sheet(path: &Path, sheet: Sheet) -> Result<SourceTable, SpreadsheetError> {
        if sheet.is_empty() {
            Err(SpreadsheetError::SheetEmptyError(sheet.file_name.to_owned(), sheet.name.to_owned()))?
        }

        let file_name = sheet.file_name.to_owned();
        let sheet_name = sheet.name.to_owned();
        let styles = sheet.styles.clone();
        let col_lower = sheet.col_lower_bound.unwrap_or(0);
        let col_upper = sheet.col_upper_bound.unwrap_or(0);
        let widths = (col_lower..=col_upper)
            .map(|index| sheet.widths.get(&index).copied())
            .collect::<Vec<_>>();

        let (first_row, mut grid) = sheet.into_grid();
        let header_cells = grid.remove(0);
        let (columns, warnings) = name_columns(&file_name, col_lower, header_cells, widths);

        Ok(SourceTable {
            path: path.to_path_buf(),
            sheet: sheet_name,
            columns,
            rows: grid,
            styles,
            first_data_row: first_row + 2,
            warnings,
        })
    }

    /// The path as shown in messages.
    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Position of a column within the table, by name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// The style of a cell of this table; `None` for unknown style indexes.
    pub fn style(&self, cell: &Cell) -> Option<&CellStyle> {
        self.styles.get(cell.style)
    }

    /// 1-based sheet row number of a data row.
    pub fn row_number(&self, row: usize) -> usize {
        self.first_data_row + row
    }
}

/// Overview of a sheet, for choosing columns.
#[derive(Clone, Debug, PartialEq)]
pub struct TableInfo {
    pub path: PathBuf,
    /// Sheet that was read
    pub sheet: String,
    /// All worksheets of the workbook
    pub sheets: Vec<String>,
    /// Column letters and names
    pub columns: Vec<(String, String)>,
    /// Number of data rows
    pub rows: usize,
}

/// Reads a sheet and summarizes its columns.
pub fn inspect(path: impl AsRef<Path>, options: &LoadOptions) -> Result<TableInfo, SpreadsheetError> {
    let path = path.as_ref();
    let (sheets, table) = read_table(path, options).with_prefix(&format!("Read '{}'", path.display()))?;
    Ok(TableInfo {
        path: table.path.to_owned(),
        columns: table
            .columns
            .iter()
            .map(|column| (column.letter(), column.name.to_owned()))
            .collect(),
        rows: table.rows.len(),
        sheet: table.sheet,
        sheets,
    })
}

fn read_table(path: &Path, options: &LoadOptions) -> Result<(Vec<String>, SourceTable), SpreadsheetError> {
    let mut workbook = open_workbook(path)?;
    let sheet_name = match &options.sheet {
        Some(name) => name.to_owned(),
        None => workbook
            .active_sheet()
            .ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(workbook.name().to_owned()))?,
    };
    let sheet = workbook.read_sheet(&sheet_name)?;
    let table = SourceTable::from_sheet(path, sheet)?;
    Ok((workbook.sheet_names(), table))
}

/// Turns header cells into unique column names.
///
/// A blank header becomes `column{N}` with N the 1-based position in the
/// table; a repeated name gets a `_{k}` suffix with the first free k from 2.
fn name_columns(
    file_name: &str,
    col_lower: usize,
    headers: Vec<Cell>,
    widths: Vec<Option<f64>>,
) -> (Vec<Column>, Vec<DataWarning>) {
    let mut used = HashSet::<String>::new();
    let mut warnings = Vec::new();
    let mut columns = Vec::with_capacity(headers.len());
    for (position, (header, width)) in headers.into_iter().zip(widths).enumerate() {
        let index = col_lower + position;
        let mut name = header.value.to_string();
        if header.value.is_blank() {
            name = format!("column{}", position + 1);
            warnings.push(DataWarning::BlankHeader {
                file: file_name.to_owned(),
                column: index_to_col(index),
                name: name.to_owned(),
            });
        }
        if used.contains(&name) {
            let original = name;
            name = (2..)
                .map(|k| format!("{original}_{k}"))
                .find(|candidate| !used.contains(candidate))
                .unwrap_or_default();
            warnings.push(DataWarning::DuplicateHeader {
                file: file_name.to_owned(),
                column: index_to_col(index),
                header: original,
                name: name.to_owned(),
            });
        }
        used.insert(name.to_owned());
        columns.push(Column {
            name,
            index,
            width,
            header,
        });
    }
    (columns, warnings)
}
