//! # Spreadsheet Reading
//!
//! Opens workbooks and turns one of their sheets into a [`SourceTable`]:
//! a header row of column names plus typed, styled data rows.
//!
//! Office Open XML workbooks (`.xlsx`, `.xlsm`, `.xltx`, `.xltm`) are parsed
//! directly from the package so that cell formats and column widths are
//! available. Legacy and foreign formats (`.xls`, `.xla`, `.xlsb`, `.ods`)
//! are read through calamine on a best-effort basis: values only, default
//! formatting.

pub mod cell;
pub(crate) mod excel;
pub(crate) mod legacy;
pub mod reference;
pub(crate) mod sheet;
pub mod style;
pub mod table;
pub(crate) mod xlsx;

use crate::helpers::xml::XmlError;
use crate::spreadsheet::legacy::LegacyWorkbook;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use std::ffi::OsStr;
use std::path::Path;
use thiserror::Error;

/// Errors raised while opening or reading a spreadsheet.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XmlHelperError(#[from] XmlError),

    #[error("{0}")]
    CalamineError(#[from] calamine::Error),

    // Spreadsheet errors that already name the file
    #[error("Cannot detect file format for '{0}'")]
    FileFormatError(String),

    #[error("Missing part '{1}' in '{0}'")]
    FilePartError(String, String),

    #[error("Spreadsheet '{0}' is password protected")]
    PasswordProtectedError(String),

    #[error("Spreadsheet '{0}' contains no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Sheet '{1}' not found in '{0}'")]
    SheetNotFoundError(String, String),

    #[error("Sheet '{1}' in '{0}' is empty")]
    SheetEmptyError(String, String),
}

impl SpreadsheetError {
    /// True for errors whose message already names the offending file.
    pub(crate) fn is_contextual(&self) -> bool {
        matches!(
            self,
            Self::WithContextError(_)
                | Self::FileFormatError(_)
                | Self::FilePartError(_, _)
                | Self::PasswordProtectedError(_)
                | Self::SpreadsheetEmptyError(_)
                | Self::SheetNotFoundError(_, _)
                | Self::SheetEmptyError(_, _)
        )
    }
}

/// A workbook opened for reading.
pub(crate) trait Workbook {
    /// File name the workbook was opened from
    fn name(&self) -> &str;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// The sheet shown when the workbook is opened, defaulting to the first
    fn active_sheet(&self) -> Option<String> {
        self.sheet_names().into_iter().next()
    }

    /// Reads every non-empty cell of a worksheet
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SpreadsheetError>;
}

/// Opens a workbook, choosing the reader from the file extension.
pub(crate) fn open_workbook(path: &Path) -> Result<Box<dyn Workbook>, SpreadsheetError> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("xlsx") | Some("xlsm") | Some("xltx") | Some("xltm") => {
            Ok(Box::new(XlsxWorkbook::open(path)?))
        }
        Some("xls") | Some("xla") | Some("xlsb") | Some("ods") => {
            Ok(Box::new(LegacyWorkbook::open(path)?))
        }
        _ => Err(SpreadsheetError::FileFormatError(path.display().to_string())),
    }
}
