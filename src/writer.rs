//! # Writing
//!
//! Renders a [`MergedTable`] into a new workbook with rust_xlsxwriter and
//! commits it atomically: the workbook is saved into a temporary file next
//! to the destination, which is renamed over the destination only after a
//! complete save.

use crate::error::MergeError;
use crate::merge::MergeOptions;
use crate::merge::MergedTable;
use crate::merge::DEFAULT_SHEET_NAME;
use crate::progress::CancellationToken;
use crate::progress::Progress;
use crate::progress::Stage;
use crate::progress::Tracker;
use crate::spreadsheet::cell::datetime_to_serial;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::style::BorderSide;
use crate::spreadsheet::style::CellStyle;
use crate::spreadsheet::table::SourceTable;
use chrono::NaiveTime;
use log::info;
use rust_xlsxwriter::Color;
use rust_xlsxwriter::Format;
use rust_xlsxwriter::FormatAlign;
use rust_xlsxwriter::FormatBorder;
use rust_xlsxwriter::FormatPattern;
use rust_xlsxwriter::FormatUnderline;
use rust_xlsxwriter::Workbook;
use rust_xlsxwriter::Worksheet;
use rust_xlsxwriter::XlsxError;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Rows of a worksheet, header row included
pub const MAX_ROWS: usize = 1_048_576;
/// Columns of a worksheet
pub const MAX_COLUMNS: usize = 16_384;
/// Characters of a worksheet name
pub const MAX_SHEET_NAME_LENGTH: usize = 31;

const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd";
const DEFAULT_DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("{0}")]
    XlsxError(#[from] XlsxError),

    #[error("{0} rows exceed the worksheet limit of {1}")]
    TooManyRows(usize, usize),

    #[error("{0} columns exceed the worksheet limit of {1}")]
    TooManyColumns(usize, usize),

    #[error("Cannot save '{0}': {1}")]
    SaveError(String, #[source] std::io::Error),
}

/// Writes the merged table to `destination`, replacing any existing file
/// only when the new one is complete.
pub fn write_merged(
    tables: &[SourceTable],
    merged: &MergedTable,
    destination: &Path,
    options: &MergeOptions,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<(), MergeError> {
    let mut workbook = render(tables, merged, options, token, progress)?;
    save(&mut workbook, destination, token, progress)?;
    info!("Wrote {} rows to '{}'", merged.rows.len(), destination.display());
    Ok(())
}

/// Builds the output workbook in memory.
pub fn render(
    tables: &[SourceTable],
    merged: &MergedTable,
    options: &MergeOptions,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Workbook, MergeError> {
    check_limits(merged)?;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let mut formats = FormatCache::new(tables);
    write_header(worksheet, tables, merged, options, &mut formats)?;

    let mut tracker = Tracker::new(Stage::Writing, merged.rows.len(), options.batch_rows, token, progress)?;
    for (row, sources) in merged.rows.iter().enumerate() {
        let row_num = cast_row_num(row + 1)?;
        for (col, source) in sources.iter().enumerate() {
            let Some(source) = source else {
                continue;
            };
            let Some(cell) = merged.cell(tables, row, col) else {
                continue;
            };
            if cell.is_empty() {
                continue;
            }
            let format = formats.get(source.table, cell);
            write_cell(worksheet, row_num, cast_col_num(col)?, &cell.value, format)?;
        }
        tracker.advance()?;
    }
    tracker.finish()?;
    Ok(workbook)
}

/// Saves the workbook through a temporary file in the destination folder.
///
/// Cancellation is honoured up to the rename; a dropped temporary file is
/// deleted.
pub fn save(
    workbook: &mut Workbook,
    destination: &Path,
    token: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<(), MergeError> {
    token.check()?;
    progress(Progress { stage: Stage::Saving, processed: 0, total: 1 });

    let name = destination.display().to_string();
    let directory = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temporary = tempfile::Builder::new()
        .prefix(".sheet-merge-")
        .suffix(".xlsx")
        .tempfile_in(directory)
        .map_err(|error| WriteError::SaveError(name.to_owned(), error))?;
    workbook
        .save_to_writer(temporary.as_file_mut())
        .map_err(WriteError::from)?;
    temporary
        .as_file()
        .sync_all()
        .map_err(|error| WriteError::SaveError(name.to_owned(), error))?;

    token.check()?;
    temporary
        .persist(destination)
        .map_err(|error| WriteError::SaveError(name.to_owned(), error.error))?;
    progress(Progress { stage: Stage::Saving, processed: 1, total: 1 });
    Ok(())
}

fn check_limits(merged: &MergedTable) -> Result<(), WriteError> {
    if merged.columns.len() > MAX_COLUMNS {
        Err(WriteError::TooManyColumns(merged.columns.len(), MAX_COLUMNS))?
    }
    // One row is taken by the header
    if merged.rows.len() + 1 > MAX_ROWS {
        Err(WriteError::TooManyRows(merged.rows.len() + 1, MAX_ROWS))?
    }
    Ok(())
}

fn write_header(
    worksheet: &mut Worksheet,
    tables: &[SourceTable],
    merged: &MergedTable,
    options: &MergeOptions,
    formats: &mut FormatCache,
) -> Result<(), WriteError> {
    worksheet.set_name(sanitize_sheet_name(&options.sheet_name))?;
    for (col, column) in merged.columns.iter().enumerate() {
        let col_num = cast_col_num(col)?;
        match column.source(tables) {
            Some(source) => {
                let format = formats.get(column.table, &source.header);
                // Keep the typed header value unless the name was made up
                if column.name == source.name && source.is_named_by_header() {
                    write_cell(worksheet, 0, col_num, &source.header.value, format)?;
                } else {
                    worksheet.write_string_with_format(0, col_num, &column.name, format)?;
                }
                if let Some(width) = source.width.map(to_user_width).filter(|width| *width > 0.0) {
                    worksheet.set_column_width(col_num, width)?;
                }
            }
            None => {
                worksheet.write_string(0, col_num, &column.name)?;
            }
        }
    }
    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: &CellValue, format: &Format) -> Result<(), WriteError> {
    match value {
        _ if value.is_blank() => {
            worksheet.write_blank(row, col, format)?;
        }
        CellValue::Blank => (),
        CellValue::Text(text) | CellValue::Error(text) => {
            worksheet.write_string_with_format(row, col, text, format)?;
        }
        CellValue::Number(number) => {
            worksheet.write_number_with_format(row, col, *number, format)?;
        }
        CellValue::Boolean(value) => {
            worksheet.write_boolean_with_format(row, col, *value, format)?;
        }
        CellValue::DateTime(datetime) => {
            worksheet.write_number_with_format(row, col, datetime_to_serial(datetime), format)?;
        }
    }
    Ok(())
}

/// Formats built so far, by table, style index and fallback date format
struct FormatCache<'a> {
    tables: &'a [SourceTable],
    formats: HashMap<(usize, usize, Option<&'static str>), Format>,
}

impl<'a> FormatCache<'a> {
    fn new(tables: &'a [SourceTable]) -> Self {
        Self {
            tables,
            formats: HashMap::new(),
        }
    }

    fn get(&mut self, table: usize, cell: &Cell) -> &Format {
        let default_style = CellStyle::default();
        let style = self
            .tables
            .get(table)
            .and_then(|source| source.style(cell))
            .unwrap_or(&default_style);

        // Dates need a date format to display as dates
        let date_format = match &cell.value {
            CellValue::DateTime(datetime) if !has_number_format(style) => Some(if datetime.time() == NaiveTime::MIN {
                DEFAULT_DATE_FORMAT
            } else {
                DEFAULT_DATETIME_FORMAT
            }),
            _ => None,
        };

        self.formats
            .entry((table, cell.style, date_format))
            .or_insert_with(|| {
                let format = derive_format(style);
                match date_format {
                    Some(code) => format.set_num_format(code),
                    None => format,
                }
            })
    }
}

fn has_number_format(style: &CellStyle) -> bool {
    style
        .num_format
        .as_deref()
        .map(|code| !code.eq_ignore_ascii_case("general"))
        .unwrap_or(false)
}

/// Re-creates a source cell style as a writer format.
pub(crate) fn derive_format(style: &CellStyle) -> Format {
    let mut format = Format::new();

    let font = &style.font;
    if let Some(name) = &font.name {
        format = format.set_font_name(name);
    }
    if let Some(size) = font.size {
        format = format.set_font_size(size);
    }
    if font.bold {
        format = format.set_bold();
    }
    if font.italic {
        format = format.set_italic();
    }
    if let Some(underline) = font.underline.as_deref().and_then(derive_format_underline) {
        format = format.set_underline(underline);
    }
    if font.strikethrough {
        format = format.set_font_strikethrough();
    }
    if let Some(color) = font.color {
        format = format.set_font_color(Color::RGB(color.0));
    }

    let fill = &style.fill;
    match fill.pattern.as_deref().and_then(derive_format_pattern) {
        Some(FormatPattern::Solid) => {
            // Solid fills paint with the pattern (foreground) colour
            format = format.set_pattern(FormatPattern::Solid);
            if let Some(color) = fill.foreground.or(fill.background) {
                format = format.set_background_color(Color::RGB(color.0));
            }
        }
        Some(pattern) => {
            format = format.set_pattern(pattern);
            if let Some(color) = fill.foreground {
                format = format.set_foreground_color(Color::RGB(color.0));
            }
            if let Some(color) = fill.background {
                format = format.set_background_color(Color::RGB(color.0));
            }
        }
        None => (),
    }

    let border = &style.border;
    if let Some((kind, color)) = derive_border_side(&border.left) {
        format = format.set_border_left(kind);
        if let Some(color) = color {
            format = format.set_border_left_color(color);
        }
    }
    if let Some((kind, color)) = derive_border_side(&border.right) {
        format = format.set_border_right(kind);
        if let Some(color) = color {
            format = format.set_border_right_color(color);
        }
    }
    if let Some((kind, color)) = derive_border_side(&border.top) {
        format = format.set_border_top(kind);
        if let Some(color) = color {
            format = format.set_border_top_color(color);
        }
    }
    if let Some((kind, color)) = derive_border_side(&border.bottom) {
        format = format.set_border_bottom(kind);
        if let Some(color) = color {
            format = format.set_border_bottom_color(color);
        }
    }

    let alignment = &style.alignment;
    if let Some(align) = alignment.horizontal.as_deref().and_then(derive_format_align) {
        format = format.set_align(align);
    }
    if let Some(align) = alignment.vertical.as_deref().and_then(derive_format_valign) {
        format = format.set_align(align);
    }
    if alignment.wrap_text {
        format = format.set_text_wrap();
    }

    if let Some(code) = &style.num_format {
        format = format.set_num_format(code);
    }

    format
}

fn derive_border_side(side: &BorderSide) -> Option<(FormatBorder, Option<Color>)> {
    let kind = side.style.as_deref().and_then(derive_format_border)?;
    Some((kind, side.color.map(|color| Color::RGB(color.0))))
}

fn derive_format_border(style: &str) -> Option<FormatBorder> {
    let border = match style {
        "thin" => FormatBorder::Thin,
        "medium" => FormatBorder::Medium,
        "dashed" => FormatBorder::Dashed,
        "dotted" => FormatBorder::Dotted,
        "thick" => FormatBorder::Thick,
        "double" => FormatBorder::Double,
        "hair" => FormatBorder::Hair,
        "mediumDashed" => FormatBorder::MediumDashed,
        "dashDot" => FormatBorder::DashDot,
        "mediumDashDot" => FormatBorder::MediumDashDot,
        "dashDotDot" => FormatBorder::DashDotDot,
        "mediumDashDotDot" => FormatBorder::MediumDashDotDot,
        "slantDashDot" => FormatBorder::SlantDashDot,
        _ => return None,
    };
    Some(border)
}

fn derive_format_align(horizontal: &str) -> Option<FormatAlign> {
    let align = match horizontal {
        "left" => FormatAlign::Left,
        "center" => FormatAlign::Center,
        "right" => FormatAlign::Right,
        "fill" => FormatAlign::Fill,
        "justify" => FormatAlign::Justify,
        "centerContinuous" => FormatAlign::CenterAcross,
        "distributed" => FormatAlign::Distributed,
        _ => return None,
    };
    Some(align)
}

fn derive_format_valign(vertical: &str) -> Option<FormatAlign> {
    let align = match vertical {
        "top" => FormatAlign::Top,
        "center" => FormatAlign::VerticalCenter,
        "justify" => FormatAlign::VerticalJustify,
        "distributed" => FormatAlign::VerticalDistributed,
        // Bottom is the default
        _ => return None,
    };
    Some(align)
}

fn derive_format_underline(underline: &str) -> Option<FormatUnderline> {
    let underline = match underline {
        "single" => FormatUnderline::Single,
        "double" => FormatUnderline::Double,
        "singleAccounting" => FormatUnderline::SingleAccounting,
        "doubleAccounting" => FormatUnderline::DoubleAccounting,
        _ => return None,
    };
    Some(underline)
}

fn derive_format_pattern(pattern: &str) -> Option<FormatPattern> {
    let pattern = match pattern {
        "solid" => FormatPattern::Solid,
        "mediumGray" => FormatPattern::MediumGray,
        "darkGray" => FormatPattern::DarkGray,
        "lightGray" => FormatPattern::LightGray,
        "darkHorizontal" => FormatPattern::DarkHorizontal,
        "darkVertical" => FormatPattern::DarkVertical,
        "darkDown" => FormatPattern::DarkDown,
        "darkUp" => FormatPattern::DarkUp,
        "darkGrid" => FormatPattern::DarkGrid,
        "darkTrellis" => FormatPattern::DarkTrellis,
        "lightHorizontal" => FormatPattern::LightHorizontal,
        "lightVertical" => FormatPattern::LightVertical,
        "lightDown" => FormatPattern::LightDown,
        "lightUp" => FormatPattern::LightUp,
        "lightGrid" => FormatPattern::LightGrid,
        "lightTrellis" => FormatPattern::LightTrellis,
        "gray125" => FormatPattern::Gray125,
        "gray0625" => FormatPattern::Gray0625,
        _ => return None,
    };
    Some(pattern)
}

/// Converts a stored column width back to the width rust_xlsxwriter expects.
///
/// Stored widths add 5 pixels of padding to a count of 7 pixel digits, so
/// writing the result reproduces the stored width.
pub(crate) fn to_user_width(width: f64) -> f64 {
    const DIGIT_PIXELS: f64 = 7.0;
    const PADDING_PIXELS: f64 = 5.0;
    if width <= 0.0 {
        return 0.0;
    }
    let pixels = (width * DIGIT_PIXELS).round();
    if pixels < DIGIT_PIXELS + PADDING_PIXELS {
        pixels / (DIGIT_PIXELS + PADDING_PIXELS)
    } else {
        (pixels - PADDING_PIXELS) / DIGIT_PIXELS
    }
}

/// Makes a worksheet name acceptable to Excel.
///
/// Removes `[ ] : * ? / \`, strips leading and trailing apostrophes and keeps
/// at most 31 characters. An empty result becomes the default name.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect::<String>();
    let cleaned = cleaned
        .trim_matches('\'')
        .chars()
        .take(MAX_SHEET_NAME_LENGTH)
        .collect::<String>();
    let cleaned = cleaned.trim_end_matches('\'').trim();
    if cleaned.is_empty() {
        DEFAULT_SHEET_NAME.to_owned()
    } else {
        cleaned.to_owned()
    }
}

fn cast_row_num(value: usize) -> Result<u32, WriteError> {
    u32::try_from(value)
        .ok()
        .filter(|row| (*row as usize) < MAX_ROWS)
        .ok_or(WriteError::TooManyRows(value + 1, MAX_ROWS))
}

fn cast_col_num(value: usize) -> Result<u16, WriteError> {
    u16::try_from(value)
        .ok()
        .filter(|col| (*col as usize) < MAX_COLUMNS)
        .ok_or(WriteError::TooManyColumns(value + 1, MAX_COLUMNS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergedColumn;
    use crate::spreadsheet::style::Rgb;

    #[test]
    fn sanitizes_sheet_names() {
        assert_eq!(sanitize_sheet_name("Q1/Q2 [draft]"), "Q1Q2 draft");
        assert_eq!(sanitize_sheet_name("'quoted'"), "quoted");
        assert_eq!(sanitize_sheet_name("???"), "Merged");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sanitize_sheet_name("Résumé"), "Résumé");
    }

    #[test]
    fn converts_stored_widths() {
        // rust_xlsxwriter stores a width of 20 as 20.7109375
        assert_eq!(to_user_width(20.7109375), 20.0);
        assert_eq!(to_user_width(8.7109375), 8.0);
        assert_eq!(to_user_width(1.7109375), 1.0);
        assert_eq!(to_user_width(0.85546875), 0.5);
        assert_eq!(to_user_width(0.0), 0.0);
    }

    #[test]
    fn maps_style_names() {
        assert_eq!(derive_format_border("mediumDashDot"), Some(FormatBorder::MediumDashDot));
        assert_eq!(derive_format_border("none"), None);
        assert_eq!(derive_format_align("centerContinuous"), Some(FormatAlign::CenterAcross));
        assert_eq!(derive_format_valign("center"), Some(FormatAlign::VerticalCenter));
        assert_eq!(derive_format_valign("bottom"), None);
        assert_eq!(derive_format_pattern("gray125"), Some(FormatPattern::Gray125));
        assert_eq!(derive_format_underline("singleAccounting"), Some(FormatUnderline::SingleAccounting));
    }

    #[test]
    fn derives_formats_from_styles() {
        let mut style = CellStyle::default();
        assert_eq!(derive_format(&style), Format::new());

        style.font.bold = true;
        style.fill.pattern = Some("solid".to_owned());
        style.fill.foreground = Some(Rgb(0xFFFF00));
        style.num_format = Some("0.00%".to_owned());
        let expected = Format::new()
            .set_bold()
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(0xFFFF00))
            .set_num_format("0.00%");
        assert_eq!(derive_format(&style), expected);
    }

    #[test]
    fn rejects_too_many_columns() {
        let column = MergedColumn {
            name: "c".to_owned(),
            table: 0,
            column: 0,
        };
        let merged = MergedTable {
            columns: vec![column; MAX_COLUMNS + 1],
            rows: Vec::new(),
        };
        let error = check_limits(&merged).unwrap_err();
        assert_eq!(error.to_string(), "16385 columns exceed the worksheet limit of 16384");
        assert!(cast_col_num(MAX_COLUMNS).is_err());
        assert_eq!(cast_row_num(MAX_ROWS - 1).ok(), Some(1_048_575));
    }
}
