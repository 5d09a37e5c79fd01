//! # Merging
//!
//! Combines the selected columns of several [`SourceTable`]s into one
//! [`MergedTable`].
//!
//! With a reference column, rows are aligned by value: each distinct
//! reference value becomes one output row, ordered by first appearance when
//! scanning the tables in input order. Without one, output row *i* is made
//! of source row *i* of every table and shorter tables leave blanks.
//!
//! The merged table does not copy cells. It points at the source cell of
//! every output position, so values and formats reach the writer untouched.

pub(crate) mod key;

use crate::error::MergeError;
use crate::merge::key::MergeKey;
use crate::progress::CancellationToken;
use crate::progress::Progress;
use crate::progress::Stage;
use crate::progress::Tracker;
use crate::report::DataWarning;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::table::Column;
use crate::spreadsheet::table::SourceTable;
use log::debug;
use std::collections::HashMap;
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_SHEET_NAME: &str = "Merged";
pub const DEFAULT_BATCH_ROWS: usize = 256;

/// Errors found before any row is aligned, plus rejected duplicates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No input spreadsheets were given")]
    NoInput,

    #[error("Expected {expected} column selections, one per input, but got {actual}")]
    SelectionCount { expected: usize, actual: usize },

    #[error("No columns are selected in any input")]
    NothingSelected,

    #[error("Column '{column}' not found in '{file}' (sheet '{sheet}')")]
    MissingColumn {
        file: String,
        sheet: String,
        column: String,
    },

    #[error("Column '{column}' is selected more than once for '{file}'")]
    DuplicateSelection { file: String, column: String },

    #[error("Reference column '{key}' not found in '{file}' (sheet '{sheet}')")]
    MissingKey {
        file: String,
        sheet: String,
        key: String,
    },

    #[error("Reference value '{key}' appears more than once in '{file}' (rows {first_row} and {row})")]
    DuplicateKey {
        file: String,
        key: String,
        first_row: usize,
        row: usize,
    },
}

/// The columns taken from one table, in output order.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ColumnSelection {
    /// Every column, in sheet order
    #[default]
    All,
    /// The named columns; an empty list takes nothing from the table
    Columns(Vec<String>),
}

impl ColumnSelection {
    pub fn none() -> Self {
        Self::Columns(Vec::new())
    }

    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Columns(names.into_iter().map(Into::into).collect())
    }
}

/// What to do when a reference value repeats within one table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DuplicateKeyPolicy {
    /// The later row replaces the earlier one
    #[default]
    LastWins,
    /// The later row is ignored
    FirstWins,
    /// The merge fails
    Reject,
}

/// Settings of a merge job.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeOptions {
    /// Name of the output worksheet
    pub sheet_name: String,
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Rows processed between progress reports and cancellation checks
    pub batch_rows: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_owned(),
            duplicate_keys: DuplicateKeyPolicy::default(),
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }
}

/// Position of a cell: table index, data row and column position in that
/// table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    pub table: usize,
    pub row: usize,
    pub column: usize,
}

/// An output column and the source column its header and width come from.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedColumn {
    pub name: String,
    pub table: usize,
    pub column: usize,
}

impl MergedColumn {
    pub fn source<'a>(&self, tables: &'a [SourceTable]) -> Option<&'a Column> {
        tables.get(self.table)?.columns.get(self.column)
    }
}

/// The aligned result of a merge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedTable {
    pub columns: Vec<MergedColumn>,
    /// One entry per output column; `None` is a blank cell
    pub rows: Vec<Vec<Option<SourceRef>>>,
}

impl MergedTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// The source cell at an output position.
    pub fn cell<'a>(&self, tables: &'a [SourceTable], row: usize, column: usize) -> Option<&'a Cell> {
        let source = (*self.rows.get(row)?.get(column)?)?;
        tables.get(source.table)?.rows.get(source.row)?.get(source.column)
    }

    /// The value at an output position, blank when no source cell exists.
    pub fn value<'a>(&self, tables: &'a [SourceTable], row: usize, column: usize) -> &'a CellValue {
        static BLANK: CellValue = CellValue::Blank;
        self.cell(tables, row, column).map(|cell| &cell.value).unwrap_or(&BLANK)
    }
}

/// Checks selections and the reference column against the tables.
pub fn validate(
    tables: &[SourceTable],
    selections: &[ColumnSelection],
    key: Option<&str>,
) -> Result<(), ValidationError> {
    resolve_selections(tables, selections, key).map(|_| ())
}

/// Resolves every selection to column positions.
fn resolve_selections(
    tables: &[SourceTable],
    selections: &[ColumnSelection],
    key: Option<&str>,
) -> Result<Vec<Vec<usize>>, ValidationError> {
    if tables.is_empty() {
        Err(ValidationError::NoInput)?
    }
    if selections.len() != tables.len() {
        Err(ValidationError::SelectionCount {
            expected: tables.len(),
            actual: selections.len(),
        })?
    }

    let mut resolved = Vec::with_capacity(tables.len());
    for (table, selection) in tables.iter().zip(selections) {
        let positions = match selection {
            ColumnSelection::All => (0..table.columns.len()).collect(),
            ColumnSelection::Columns(names) => {
                let mut seen = HashSet::new();
                let mut positions = Vec::with_capacity(names.len());
                for name in names {
                    if !seen.insert(name.as_str()) {
                        Err(ValidationError::DuplicateSelection {
                            file: table.file_name(),
                            column: name.to_owned(),
                        })?
                    }
                    let position = table.column_position(name).ok_or_else(|| ValidationError::MissingColumn {
                        file: table.file_name(),
                        sheet: table.sheet.to_owned(),
                        column: name.to_owned(),
                    })?;
                    positions.push(position);
                }
                positions
            }
        };
        resolved.push(positions);
    }

    if resolved.iter().all(Vec::is_empty) {
        Err(ValidationError::NothingSelected)?
    }
    if let Some(key) = key {
        for (table, positions) in tables.iter().zip(&resolved) {
            if !positions.is_empty() && table.column_position(key).is_none() {
                Err(ValidationError::MissingKey {
                    file: table.file_name(),
                    sheet: table.sheet.to_owned(),
                    key: key.to_owned(),
                })?
            }
        }
    }
    Ok(resolved)
}

/// Output columns and where each table's cells go.
struct ColumnPlan {
    columns: Vec<MergedColumn>,
    /// Per table: (column position, output column) of every non-key column
    slots: Vec<Vec<(usize, usize)>>,
    /// Output column of the reference column, when selected
    key_output: Option<usize>,
}

/// Lays out output columns in selection order.
///
/// The reference column is emitted once, where it is first selected, or
/// first of all when no table selects it. Any other repeated name gets the
/// suffix `_{n}`, n being the 1-based input position of its table.
fn plan_columns(tables: &[SourceTable], resolved: &[Vec<usize>], key: Option<&str>) -> ColumnPlan {
    let mut used = HashSet::<String>::new();
    let mut columns = Vec::new();
    let mut slots = vec![Vec::new(); tables.len()];
    let mut key_output = None;
    if let Some(key) = key {
        let selected = resolved
            .iter()
            .enumerate()
            .any(|(table, positions)| positions.iter().any(|&position| tables[table].columns[position].name == key));
        let first = resolved
            .iter()
            .enumerate()
            .filter(|(_, positions)| !positions.is_empty())
            .find_map(|(table, _)| Some((table, tables[table].column_position(key)?)));
        if let (false, Some((table, column))) = (selected, first) {
            key_output = Some(0);
            used.insert(key.to_owned());
            columns.push(MergedColumn {
                name: key.to_owned(),
                table,
                column,
            });
        }
    }
    for (table, positions) in resolved.iter().enumerate() {
        for &position in positions {
            let name = &tables[table].columns[position].name;
            let is_key = key == Some(name.as_str());
            if is_key {
                if key_output.is_some() {
                    continue;
                }
                key_output = Some(columns.len());
            } else {
                slots[table].push((position, columns.len()));
            }

            let output_name = unique_name(name, table, &used);
            used.insert(output_name.to_owned());
            columns.push(MergedColumn {
                name: output_name,
                table,
                column: position,
            });
        }
    }
    ColumnPlan {
        columns,
        slots,
        key_output,
    }
}

fn unique_name(name: &str, table: usize, used: &HashSet<String>) -> String {
    if !used.contains(name) {
        return name.to_owned();
    }
    let suffixed = format!("{name}_{}", table + 1);
    if !used.contains(&suffixed) {
        return suffixed;
    }
    (2..)
        .map(|k| format!("{suffixed}_{k}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or(suffixed)
}

/// Aligns the selected columns of the tables into one table.
///
/// Returns the merged table and every data warning, header warnings of
/// the inputs included.
pub fn merge_tables(
    tables: &[SourceTable],
    selections: &[ColumnSelection],
    key: Option<&str>,
    options: &MergeOptions,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<(MergedTable, Vec<DataWarning>), MergeError> {
    let resolved = resolve_selections(tables, selections, key)?;
    let plan = plan_columns(tables, &resolved, key);
    let participants = resolved
        .iter()
        .enumerate()
        .filter(|(_, positions)| !positions.is_empty())
        .map(|(table, _)| table)
        .collect::<Vec<_>>();

    let mut warnings = tables
        .iter()
        .flat_map(|table| table.warnings.iter().cloned())
        .collect::<Vec<_>>();
    let total = participants.iter().map(|&table| tables[table].rows.len()).sum();
    let mut tracker = Tracker::new(Stage::Aligning, total, options.batch_rows, token, progress)?;
    let mut aligner = Aligner {
        tables,
        plan: &plan,
        rows: Vec::new(),
        warnings: &mut warnings,
        tracker: &mut tracker,
    };
    match key {
        Some(key) => aligner.align_by_key(&participants, key, options.duplicate_keys)?,
        None => aligner.align_by_position(&participants)?,
    }
    let rows = aligner.rows;
    tracker.finish()?;

    debug!(
        "Merged {} tables into {} rows and {} columns",
        participants.len(),
        rows.len(),
        plan.columns.len()
    );
    Ok((
        MergedTable {
            columns: plan.columns,
            rows,
        },
        warnings,
    ))
}

struct Aligner<'a, 't> {
    tables: &'a [SourceTable],
    plan: &'a ColumnPlan,
    rows: Vec<Vec<Option<SourceRef>>>,
    warnings: &'a mut Vec<DataWarning>,
    tracker: &'a mut Tracker<'t>,
}

impl Aligner<'_, '_> {
    fn new_row(&mut self) -> usize {
        self.rows.push(vec![None; self.plan.columns.len()]);
        self.rows.len() - 1
    }

    /// Points the output row at the cells of a source row.
    fn fill(&mut self, output: usize, table: usize, row: usize) {
        for &(column, slot) in &self.plan.slots[table] {
            self.rows[output][slot] = Some(SourceRef { table, row, column });
        }
    }

    fn align_by_position(&mut self, participants: &[usize]) -> Result<(), MergeError> {
        for &table in participants {
            for row in 0..self.tables[table].rows.len() {
                while self.rows.len() <= row {
                    self.new_row();
                }
                self.fill(row, table, row);
                self.tracker.advance()?;
            }
        }
        Ok(())
    }

    fn align_by_key(&mut self, participants: &[usize], key: &str, policy: DuplicateKeyPolicy) -> Result<(), MergeError> {
        let tables = self.tables;
        let mut index = HashMap::<MergeKey, usize>::new();
        for &table in participants {
            let source = &tables[table];
            let Some(key_column) = source.column_position(key) else {
                continue;
            };
            // First source row of every reference value in this table
            let mut seen = HashMap::<MergeKey, usize>::new();
            for (row, cells) in source.rows.iter().enumerate() {
                self.tracker.advance()?;
                let key_cell = &cells[key_column];
                let Some(merge_key) = MergeKey::from_value(&key_cell.value) else {
                    self.warnings.push(DataWarning::BlankKey {
                        file: source.file_name(),
                        row: source.row_number(row),
                    });
                    let output = self.new_row();
                    self.fill(output, table, row);
                    self.fill_key(output, table, row, key_column);
                    continue;
                };

                if let Some(&first) = seen.get(&merge_key) {
                    let value = key_cell.value.to_string();
                    match policy {
                        DuplicateKeyPolicy::Reject => Err(ValidationError::DuplicateKey {
                            file: source.file_name(),
                            key: value,
                            first_row: source.row_number(first),
                            row: source.row_number(row),
                        })?,
                        DuplicateKeyPolicy::FirstWins | DuplicateKeyPolicy::LastWins => {
                            let replaced = policy == DuplicateKeyPolicy::LastWins;
                            self.warnings.push(DataWarning::DuplicateKey {
                                file: source.file_name(),
                                key: value,
                                row: source.row_number(row),
                                first_row: source.row_number(first),
                                replaced,
                            });
                            if !replaced {
                                continue;
                            }
                        }
                    }
                } else {
                    seen.insert(merge_key.clone(), row);
                }

                let output = match index.get(&merge_key) {
                    Some(&output) => output,
                    None => {
                        let output = self.new_row();
                        index.insert(merge_key, output);
                        output
                    }
                };
                self.fill(output, table, row);
                self.fill_key(output, table, row, key_column);
            }
            debug!("Aligned {} rows of '{}' by '{}'", source.rows.len(), source.file_name(), key);
        }
        Ok(())
    }

    /// The reference cell of a row comes from the first table that produced it.
    fn fill_key(&mut self, output: usize, table: usize, row: usize, column: usize) {
        if let Some(slot) = self.plan.key_output {
            let cell = &mut self.rows[output][slot];
            if cell.is_none() {
                *cell = Some(SourceRef { table, row, column });
            }
        }
    }
}
