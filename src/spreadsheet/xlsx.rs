use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::serial_to_datetime;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::Package;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::style::load_styles;
use crate::spreadsheet::style::StyleSheet;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::Workbook;
use log::debug;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::io::BufRead;
use std::path::Path;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELATIONSHIPS_PART: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PART: &str = "xl/styles.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_WORKBOOK_VIEW: QName = QName(b"workbookView");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_COLUMN: QName = QName(b"col");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

/// Largest column count of a worksheet
const MAX_COLUMNS: usize = 16_384;

/// Value type of a `<c>` element, from its `t` attribute
#[derive(Copy, Clone, Debug, Default, PartialEq)]
enum ValueType {
    #[default]
    Number,
    SharedString,
    InlineString,
    Boolean,
    IsoDateTime,
    Error,
}

impl ValueType {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("s") => Self::SharedString,
            Some("inlineStr") | Some("str") => Self::InlineString,
            Some("b") => Self::Boolean,
            Some("d") => Self::IsoDateTime,
            Some("e") => Self::Error,
            _ => Self::Number,
        }
    }
}

/// An Office Open XML workbook
pub(crate) struct XlsxWorkbook {
    /// File name of the workbook
    name: String,
    zip: Package,
    styles: StyleSheet,
    /// Shared string table, loaded on first sheet read
    shared_strings: Option<Vec<String>>,
    /// Worksheets as (name, package path) pairs
    sheets: Vec<(String, String)>,
    /// Name of the sheet selected when the file was saved
    active_sheet: Option<String>,
    is_1904: bool,
}

impl XlsxWorkbook {
    /// Opens a workbook and parses its sheet list and styles
    pub(crate) fn open(path: &Path) -> Result<XlsxWorkbook, SpreadsheetError> {
        let name = path.display().to_string();
        let mut zip = excel::open(path)?;
        let layout = load_workbook(&mut zip, &name)?;
        if layout.sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(name.to_owned()))?
        }

        let styles = match zip.xml_reader(STYLES_PART)? {
            Some(mut reader) => load_styles(&mut reader)?,
            None => StyleSheet::default(),
        };
        debug!("Opened '{}' with {} sheets and {} cell formats", name, layout.sheets.len(), styles.styles.len());

        Ok(XlsxWorkbook {
            name,
            zip,
            styles,
            shared_strings: None,
            sheets: layout.sheets,
            active_sheet: layout.active_sheet,
            is_1904: layout.is_1904,
        })
    }

    fn load_shared_strings(&mut self) -> Result<(), SpreadsheetError> {
        if self.shared_strings.is_some() {
            return Ok(());
        }

        let mut shared_strings = Vec::<String>::new();
        if let Some(mut reader) = self.zip.xml_reader(SHARED_STRINGS_PART)? {
            match_xml_events!(reader => {
                Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                    shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
                }
            });
        }
        self.shared_strings = Some(shared_strings);
        Ok(())
    }
}

/// Turns the raw text of `<c>` elements into typed values
struct CellDecoder<'a> {
    shared_strings: &'a [String],
    styles: &'a StyleSheet,
    is_1904: bool,
}

impl CellDecoder<'_> {
    fn decode(&self, kind: ValueType, style: usize, raw: Option<String>) -> Result<CellValue, SpreadsheetError> {
        let Some(raw) = raw else {
            return Ok(CellValue::Blank);
        };

        let value = match kind {
            ValueType::SharedString => {
                let index = raw.trim().parse::<usize>()?;
                CellValue::Text(self.shared_strings.get(index).cloned().unwrap_or_default())
            }
            ValueType::InlineString => CellValue::Text(raw),
            ValueType::Boolean => CellValue::Boolean(matches!(raw.trim(), "1" | "true" | "TRUE")),
            ValueType::IsoDateTime => match parse_iso_datetime(raw.trim()) {
                Some(datetime) => CellValue::DateTime(datetime),
                None => CellValue::Text(raw),
            },
            ValueType::Error => CellValue::Error(raw),
            ValueType::Number if raw.trim().is_empty() => CellValue::Blank,
            ValueType::Number => {
                let number = raw.trim().parse::<f64>()?;
                if self.styles.number_kind(style).is_temporal() {
                    serial_to_datetime(number, self.is_1904)
                        .map(CellValue::DateTime)
                        .unwrap_or(CellValue::Number(number))
                } else {
                    CellValue::Number(number)
                }
            }
        };
        Ok(value)
    }
}

impl Workbook for XlsxWorkbook {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn active_sheet(&self) -> Option<String> {
        self.active_sheet
            .clone()
            .or_else(|| self.sheets.first().map(|(name, _)| name.to_owned()))
    }

    /// Parses a worksheet part into cells, formats and column widths
    ///
    /// Formula cells contribute their cached result. Cells without a value
    /// are kept when they carry a cell format.
    fn read_sheet(&mut self, sheet_name: &str) -> Result<Sheet, SpreadsheetError> {
        let zip_path = self.sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, path)| path.to_owned())
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned(), sheet_name.to_owned()))?;
        self.load_shared_strings()?;

        let mut sheet = Sheet::new(&self.name, sheet_name, self.styles.styles.clone());
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = ValueType::default();
        let mut style = 0usize;
        let mut value = None::<String>;

        let decoder = CellDecoder {
            shared_strings: self.shared_strings.as_deref().unwrap_or_default(),
            styles: &self.styles,
            is_1904: self.is_1904,
        };
        let mut reader = self.zip
            .xml_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::FilePartError(self.name.to_owned(), zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_COLUMN => {
                let min = event.parse_attribute_value::<usize>("min")?;
                let max = event.parse_attribute_value::<usize>("max")?;
                let width = event.parse_attribute_value::<f64>("width")?;
                if let (Some(min), Some(max), Some(width)) = (min, max, width) {
                    for index in min.max(1)..=max.min(MAX_COLUMNS) {
                        sheet.widths.insert(index - 1, width);
                    }
                }
            }
            Event::Start(event) if event.name() == TAG_ROW => {
                if let Some(number) = event.parse_attribute_value::<usize>("r")? {
                    row_count = number.saturating_sub(1);
                }
                col_count = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => row_count += 1,
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                style = event.parse_attribute_value::<usize>("s")?.unwrap_or(0);
                kind = ValueType::parse(event.get_attribute_value("t")?.as_deref());
                value = None;
            }
            Event::Start(event) if event.name() == TAG_INLINE_STRING => {
                value = Some(read_string_value(&mut reader, TAG_INLINE_STRING, false)?);
            }
            Event::Start(event) if event.name() == TAG_VALUE => {
                value = Some(read_string_value(&mut reader, TAG_VALUE, true)?);
            }
            Event::End(event) if event.name() == TAG_CELL => {
                let cell_value = decoder.decode(kind, style, value.take())?;
                sheet.push(row, col, Cell::new(cell_value, style));
            }
        });

        debug!("Read {} cells from sheet '{}' of '{}'", sheet.cells.len(), sheet_name, self.name);
        Ok(sheet)
    }
}

/// Sheet list and workbook properties from `xl/workbook.xml`
struct WorkbookLayout {
    sheets: Vec<(String, String)>,
    active_sheet: Option<String>,
    is_1904: bool,
}

fn load_workbook(zip: &mut Package, file_name: &str) -> Result<WorkbookLayout, SpreadsheetError> {
    let relationships = load_relationships(zip, WORKBOOK_RELATIONSHIPS_PART)?;
    let mut reader = zip
        .xml_reader(WORKBOOK_PART)?
        .ok_or_else(|| SpreadsheetError::FilePartError(file_name.to_owned(), WORKBOOK_PART.to_owned()))?;

    // Every sheet in tab order; chart sheets have no worksheet path
    let mut tabs = Vec::<(String, Option<String>)>::new();
    let mut active_tab = 0usize;
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some(name) = name {
                let path = id.and_then(|id| relationships.get(id.as_ref()).cloned());
                tabs.push((name.to_string(), path));
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_VIEW => {
            active_tab = event.parse_attribute_value::<usize>("activeTab")?.unwrap_or(0);
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_flag("date1904")?.unwrap_or(false);
        }
    });

    let active_sheet = tabs
        .get(active_tab)
        .filter(|(_, path)| path.is_some())
        .map(|(name, _)| name.to_owned());
    let sheets = tabs
        .into_iter()
        .filter_map(|(name, path)| path.map(|path| (name, path)))
        .collect();
    Ok(WorkbookLayout {
        sheets,
        active_sheet,
        is_1904,
    })
}

/// Reads the text of a string item, inline string or value element
///
/// Phonetic runs are skipped. With `is_text_content` the element's own
/// text is taken; otherwise only `<t>` children are read.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SpreadsheetError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_rich_text_without_phonetic_runs() -> Result<(), SpreadsheetError> {
        let xml = r#"<si><r><t>東京</t></r><r><t xml:space="preserve"> &amp; Kyoto</t></r><rPh sb="0" eb="2"><t>トウキョウ</t></rPh></si>"#;
        let mut reader = XmlReader::new(Cursor::new(xml.as_bytes()));
        let mut strings = Vec::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
            }
        });
        assert_eq!(strings, vec!["東京 & Kyoto".to_string()]);
        Ok(())
    }

    #[test]
    fn classifies_cell_types() {
        assert_eq!(ValueType::parse(None), ValueType::Number);
        assert_eq!(ValueType::parse(Some("n")), ValueType::Number);
        assert_eq!(ValueType::parse(Some("s")), ValueType::SharedString);
        assert_eq!(ValueType::parse(Some("str")), ValueType::InlineString);
        assert_eq!(ValueType::parse(Some("e")), ValueType::Error);
    }
}
