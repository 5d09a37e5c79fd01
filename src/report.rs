//! Non-fatal findings and the outcome of a merge.

use std::fmt::Display;
use std::path::PathBuf;

/// A data problem that does not stop the merge.
///
/// Row numbers are 1-based sheet rows, column letters refer to the source
/// sheet.
#[derive(Clone, Debug, PartialEq)]
pub enum DataWarning {
    /// A reference value occurs again within one table
    DuplicateKey {
        file: String,
        key: String,
        row: usize,
        first_row: usize,
        /// True when the later row replaced the earlier one
        replaced: bool,
    },
    /// A row has no reference value and was kept as its own output row
    BlankKey { file: String, row: usize },
    /// A header cell is blank and a generated name was used
    BlankHeader {
        file: String,
        column: String,
        name: String,
    },
    /// A header name occurs more than once and was renamed
    DuplicateHeader {
        file: String,
        column: String,
        header: String,
        name: String,
    },
}

impl Display for DataWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { file, key, row, first_row, replaced } => {
                let outcome = if *replaced { "using row" } else { "ignoring row" };
                write!(f, "'{file}': reference value '{key}' repeats row {first_row} at row {row}, {outcome} {row}")
            }
            Self::BlankKey { file, row } => {
                write!(f, "'{file}': row {row} has no reference value and is kept unmatched")
            }
            Self::BlankHeader { file, column, name } => {
                write!(f, "'{file}': column {column} has no header, named '{name}'")
            }
            Self::DuplicateHeader { file, column, header, name } => {
                write!(f, "'{file}': header '{header}' of column {column} is repeated, renamed to '{name}'")
            }
        }
    }
}

/// What a merge produced.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeReport {
    pub output: PathBuf,
    /// Data rows written, excluding the header row
    pub rows: usize,
    pub columns: usize,
    pub warnings: Vec<DataWarning>,
}

impl MergeReport {
    /// One-line description for people.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Wrote {} rows and {} columns to '{}'",
            self.rows,
            self.columns,
            self.output.display()
        );
        match self.warnings.len() {
            0 => (),
            1 => summary.push_str(" with 1 warning"),
            count => summary.push_str(&format!(" with {count} warnings")),
        }
        summary
    }
}
