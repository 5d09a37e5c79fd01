use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::style::CellStyle;
use std::collections::HashMap;

/// A cell together with its 0-based position in the worksheet.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PlacedCell {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) cell: Cell,
}

/// The non-empty cells of one worksheet as read from a workbook.
pub(crate) struct Sheet {
    /// Source file name
    pub(crate) file_name: String,
    /// Sheet name
    pub(crate) name: String,
    /// Cells with a value or a format, in reading order
    pub(crate) cells: Vec<PlacedCell>,
    /// Resolved styles referenced by `Cell::style`
    pub(crate) styles: Vec<CellStyle>,
    /// Column widths in file units (characters plus padding), by 0-based column
    pub(crate) widths: HashMap<usize, f64>,
    /// Used range, spanned by the cells that hold a value
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(file_name: &str, name: &str, styles: Vec<CellStyle>) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            styles,
            widths: HashMap::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Returns true if no cell holds a value.
    pub(crate) fn is_empty(&self) -> bool {
        self.row_lower_bound.is_none()
    }

    /// Adds a cell, ignoring blank cells without formatting.
    pub(crate) fn push(&mut self, row: usize, col: usize, cell: Cell) {
        if cell.is_empty() {
            return;
        }
        if !cell.value.is_blank() {
            self.update_bound(row, col);
        }
        self.cells.push(PlacedCell { row, col, cell });
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|lower| row < lower).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|upper| upper < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|lower| col < lower).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|upper| upper < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Lays the cells out as a dense grid over the used range.
    ///
    /// Returns the 0-based sheet row of the first grid row together with the
    /// grid; positions without a cell hold `Cell::default()`. Formatted blank
    /// cells outside the used range are dropped.
    pub(crate) fn into_grid(self) -> (usize, Vec<Vec<Cell>>) {
        let (Some(row_lower), Some(row_upper), Some(col_lower), Some(col_upper)) = (
            self.row_lower_bound,
            self.row_upper_bound,
            self.col_lower_bound,
            self.col_upper_bound,
        ) else {
            return (0, Vec::new());
        };

        let width = col_upper - col_lower + 1;
        let mut grid = vec![vec![Cell::default(); width]; row_upper - row_lower + 1];
        for placed in self.cells {
            let rows = row_lower..=row_upper;
            let cols = col_lower..=col_upper;
            if rows.contains(&placed.row) && cols.contains(&placed.col) {
                grid[placed.row - row_lower][placed.col - col_lower] = placed.cell;
            }
        }
        (row_lower, grid)
    }
}
