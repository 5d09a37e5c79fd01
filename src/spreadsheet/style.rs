//! Cell formatting attributes and the `xl/styles.xml` loader.
//!
//! Attribute names (pattern types, border styles, alignments) are kept as the
//! OOXML tokens found in the source file so that they survive a merge
//! unchanged; the writer maps them onto its own format model.

use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::match_xml_events;
use crate::spreadsheet::cell::NumberKind;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::BufRead;

const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FONTS: QName = QName(b"fonts");
const TAG_FONT: QName = QName(b"font");
const TAG_FILLS: QName = QName(b"fills");
const TAG_FILL: QName = QName(b"fill");
const TAG_BORDERS: QName = QName(b"borders");
const TAG_BORDER: QName = QName(b"border");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_ALIGNMENT: QName = QName(b"alignment");
const TAG_COLOR: QName = QName(b"color");

/// An opaque RGB colour, `0xRRGGBB`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rgb(pub u32);

impl Rgb {
    /// Parses an OOXML `rgb` attribute (`AARRGGBB` or `RRGGBB`).
    pub(crate) fn parse(value: &str) -> Option<Rgb> {
        let value = value.trim();
        if !value.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return None;
        }
        let digits = match value.len() {
            8 => value.get(2..)?,
            6 => value,
            _ => return None,
        };
        u32::from_str_radix(digits, 16).ok().map(Rgb)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Font {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    /// `single`, `double`, `singleAccounting` or `doubleAccounting`
    pub underline: Option<String>,
    pub strikethrough: bool,
    pub color: Option<Rgb>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fill {
    /// Pattern type such as `solid` or `gray125`
    pub pattern: Option<String>,
    pub foreground: Option<Rgb>,
    pub background: Option<Rgb>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BorderSide {
    /// Line style such as `thin`, `medium` or `dashed`
    pub style: Option<String>,
    pub color: Option<Rgb>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Border {
    pub left: BorderSide,
    pub right: BorderSide,
    pub top: BorderSide,
    pub bottom: BorderSide,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Alignment {
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub wrap_text: bool,
}

/// Formatting attributes of one cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellStyle {
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    pub alignment: Alignment,
    /// Number format code; `None` is `General`
    pub num_format: Option<String>,
}

/// Resolved cell formats of a workbook, indexed by the cell `s` attribute.
#[derive(Debug, Default)]
pub(crate) struct StyleSheet {
    pub(crate) styles: Vec<CellStyle>,
    pub(crate) number_kinds: Vec<NumberKind>,
}

impl StyleSheet {
    /// Number kind of a style index, `Number` for unknown indexes
    pub(crate) fn number_kind(&self, index: usize) -> NumberKind {
        self.number_kinds.get(index).copied().unwrap_or_default()
    }
}

/// Code of a built-in number format id.
pub(crate) fn builtin_number_format(id: u32) -> Option<&'static str> {
    let code = match id {
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        5 => "($#,##0_);($#,##0)",
        6 => "($#,##0_);[Red]($#,##0)",
        7 => "($#,##0.00_);($#,##0.00)",
        8 => "($#,##0.00_);[Red]($#,##0.00)",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "m/d/yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "(#,##0_);(#,##0)",
        38 => "(#,##0_);[Red](#,##0)",
        39 => "(#,##0.00_);(#,##0.00)",
        40 => "(#,##0.00_);[Red](#,##0.00)",
        41 => "_(* #,##0_);_(* (#,##0);_(* \"-\"_);_(@_)",
        42 => "_($* #,##0_);_($* (#,##0);_($* \"-\"_);_(@_)",
        43 => "_(* #,##0.00_);_(* (#,##0.00);_(* \"-\"??_);_(@_)",
        44 => "_($* #,##0.00_);_($* (#,##0.00);_($* \"-\"??_);_(@_)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mm:ss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

/// A `cellXfs/xf` record before its references are resolved
#[derive(Debug, Default)]
struct FormatRecord {
    num_format_id: u32,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    alignment: Alignment,
}

#[derive(Copy, Clone, PartialEq)]
enum Section {
    Other,
    CustomFormats,
    Fonts,
    Fills,
    Borders,
    FormatIndexes,
}

#[derive(Copy, Clone)]
enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

fn read_color(event: &BytesStart) -> Result<Option<Rgb>, SpreadsheetError> {
    Ok(event.get_attribute_value("rgb")?.and_then(|rgb| Rgb::parse(&rgb)))
}

/// Parses a styles part into resolved cell styles.
pub(crate) fn load_styles<R: BufRead>(reader: &mut XmlReader<R>) -> Result<StyleSheet, SpreadsheetError> {
    let mut section = Section::Other;
    let mut custom_formats = HashMap::<u32, String>::new();
    let mut fonts = Vec::<Font>::new();
    let mut fills = Vec::<Fill>::new();
    let mut borders = Vec::<Border>::new();
    let mut records = Vec::<FormatRecord>::new();

    let mut font = None::<Font>;
    let mut fill = None::<Fill>;
    let mut border = None::<Border>;
    let mut side = None::<Side>;

    match_xml_events!(reader => {
        Event::Start(event) if section == Section::Other => {
            section = match event.name() {
                TAG_CUSTOM_FORMATS => Section::CustomFormats,
                TAG_FONTS => Section::Fonts,
                TAG_FILLS => Section::Fills,
                TAG_BORDERS => Section::Borders,
                TAG_FORMAT_INDEXES => Section::FormatIndexes,
                _ => Section::Other,
            };
        }
        Event::End(event) if matches!(event.name(), TAG_CUSTOM_FORMATS | TAG_FONTS | TAG_FILLS | TAG_BORDERS | TAG_FORMAT_INDEXES) => {
            section = Section::Other;
        }

        Event::Start(event) if section == Section::CustomFormats && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.parse_attribute_value::<u32>("numFmtId")?;
            let code = event.get_attribute_value("formatCode")?;
            if let Some((id, code)) = id.zip(code) {
                custom_formats.insert(id, code.to_string());
            }
        }

        Event::Start(event) if section == Section::Fonts => {
            match event.name().as_ref() {
                b"font" => font = Some(Font::default()),
                b"b" => if let Some(font) = &mut font { font.bold = event.get_flag("val")?.unwrap_or(true) },
                b"i" => if let Some(font) = &mut font { font.italic = event.get_flag("val")?.unwrap_or(true) },
                b"strike" => if let Some(font) = &mut font { font.strikethrough = event.get_flag("val")?.unwrap_or(true) },
                b"u" => if let Some(font) = &mut font {
                    let underline = event.get_attribute_value("val")?.map(|v| v.to_string()).unwrap_or_else(|| "single".to_owned());
                    font.underline = Some(underline).filter(|underline| underline != "none");
                },
                b"sz" => if let Some(font) = &mut font { font.size = event.parse_attribute_value("val")? },
                b"name" => if let Some(font) = &mut font { font.name = event.get_attribute_value("val")?.map(|v| v.to_string()) },
                b"color" => if let Some(font) = &mut font { font.color = read_color(&event)? },
                _ => (),
            }
        }
        Event::End(event) if section == Section::Fonts && event.name() == TAG_FONT => {
            fonts.extend(font.take());
        }

        Event::Start(event) if section == Section::Fills => {
            match event.name().as_ref() {
                b"fill" => fill = Some(Fill::default()),
                b"patternFill" => if let Some(fill) = &mut fill {
                    fill.pattern = event.get_attribute_value("patternType")?.map(|v| v.to_string());
                },
                b"fgColor" => if let Some(fill) = &mut fill { fill.foreground = read_color(&event)? },
                b"bgColor" => if let Some(fill) = &mut fill { fill.background = read_color(&event)? },
                _ => (),
            }
        }
        Event::End(event) if section == Section::Fills && event.name() == TAG_FILL => {
            fills.extend(fill.take());
        }

        Event::Start(event) if section == Section::Borders => {
            let name = event.name();
            if name == TAG_BORDER {
                border = Some(Border::default());
            } else if name == TAG_COLOR {
                if let Some((border, side)) = border.as_mut().zip(side) {
                    border.side_mut(side).color = read_color(&event)?;
                }
            } else {
                side = match name.as_ref() {
                    b"left" | b"start" => Some(Side::Left),
                    b"right" | b"end" => Some(Side::Right),
                    b"top" => Some(Side::Top),
                    b"bottom" => Some(Side::Bottom),
                    _ => None,
                };
                if let Some((border, side)) = border.as_mut().zip(side) {
                    border.side_mut(side).style = event
                        .get_attribute_value("style")?
                        .map(|v| v.to_string())
                        .filter(|style| style != "none");
                }
            }
        }
        Event::End(event) if section == Section::Borders && event.name() == TAG_BORDER => {
            borders.extend(border.take());
            side = None;
        }
        Event::End(event) if section == Section::Borders && event.name() != TAG_COLOR => {
            side = None;
        }

        Event::Start(event) if section == Section::FormatIndexes && event.name() == TAG_FORMAT_INDEX => {
            records.push(FormatRecord {
                num_format_id: event.parse_attribute_value("numFmtId")?.unwrap_or(0),
                font_id: event.parse_attribute_value("fontId")?.unwrap_or(0),
                fill_id: event.parse_attribute_value("fillId")?.unwrap_or(0),
                border_id: event.parse_attribute_value("borderId")?.unwrap_or(0),
                alignment: Alignment::default(),
            });
        }
        Event::Start(event) if section == Section::FormatIndexes && event.name() == TAG_ALIGNMENT => {
            if let Some(record) = records.last_mut() {
                record.alignment = Alignment {
                    horizontal: event.get_attribute_value("horizontal")?.map(|v| v.to_string()),
                    vertical: event.get_attribute_value("vertical")?.map(|v| v.to_string()),
                    wrap_text: event.get_flag("wrapText")?.unwrap_or(false),
                };
            }
        }
    });

    let mut sheet = StyleSheet::default();
    for record in records {
        let custom = custom_formats.get(&record.num_format_id);
        let num_format = custom
            .map(String::as_str)
            .or_else(|| builtin_number_format(record.num_format_id))
            .map(str::to_owned);
        let number_kind = match custom {
            Some(code) => NumberKind::from_format_code(code),
            None => NumberKind::from_builtin_id(record.num_format_id).unwrap_or_default(),
        };
        sheet.styles.push(CellStyle {
            font: fonts.get(record.font_id).cloned().unwrap_or_default(),
            fill: fills.get(record.fill_id).cloned().unwrap_or_default(),
            border: borders.get(record.border_id).cloned().unwrap_or_default(),
            alignment: record.alignment,
            num_format,
        });
        sheet.number_kinds.push(number_kind);
    }
    if sheet.styles.is_empty() {
        sheet.styles.push(CellStyle::default());
        sheet.number_kinds.push(NumberKind::Number);
    }
    Ok(sheet)
}

impl Border {
    fn side_mut(&mut self, side: Side) -> &mut BorderSide {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
            Side::Top => &mut self.top,
            Side::Bottom => &mut self.bottom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd"/></numFmts>
  <fonts count="2">
    <font><sz val="11"/><color theme="1"/><name val="Calibri"/><family val="2"/></font>
    <font><b/><i/><u val="double"/><sz val="14"/><color rgb="FFFF0000"/><name val="Arial"/></font>
  </fonts>
  <fills count="3">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="gray125"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <borders count="2">
    <border><left/><right/><top/><bottom/><diagonal/></border>
    <border><left style="thin"><color auto="1"/></left><right/><top style="dashed"><color rgb="FF0000FF"/></top><bottom style="double"/><diagonal style="thick"><color rgb="FF00FF00"/></diagonal></border>
  </borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="1" fillId="2" borderId="1"/></cellStyleXfs>
  <cellXfs count="3">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="164" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1"><alignment horizontal="center" vertical="top" wrapText="1"/></xf>
    <xf numFmtId="4" fontId="0" fillId="0" borderId="0" xfId="0"/>
  </cellXfs>
  <dxfs count="1"><dxf><font><b/></font><fill><patternFill><bgColor rgb="FF123456"/></patternFill></fill></dxf></dxfs>
</styleSheet>"#;

    fn load() -> StyleSheet {
        let mut reader = XmlReader::new(Cursor::new(STYLES.as_bytes()));
        load_styles(&mut reader).expect("styles")
    }

    #[test]
    fn resolves_cell_formats() {
        let sheet = load();
        assert_eq!(sheet.styles.len(), 3);

        let default = &sheet.styles[0];
        assert_eq!(default.font.name.as_deref(), Some("Calibri"));
        assert_eq!(default.font.size, Some(11.0));
        assert_eq!(default.font.color, None);
        assert_eq!(default.fill.pattern.as_deref(), Some("none"));
        assert_eq!(default.num_format, None);

        let styled = &sheet.styles[1];
        assert!(styled.font.bold && styled.font.italic);
        assert_eq!(styled.font.underline.as_deref(), Some("double"));
        assert_eq!(styled.font.color, Some(Rgb(0xFF0000)));
        assert_eq!(styled.fill.pattern.as_deref(), Some("solid"));
        assert_eq!(styled.fill.foreground, Some(Rgb(0xFFFF00)));
        assert_eq!(styled.fill.background, None);
        assert_eq!(styled.border.left.style.as_deref(), Some("thin"));
        assert_eq!(styled.border.left.color, None);
        assert_eq!(styled.border.top.color, Some(Rgb(0x0000FF)));
        assert_eq!(styled.border.bottom.style.as_deref(), Some("double"));
        assert_eq!(styled.border.right, BorderSide::default());
        assert_eq!(styled.alignment.horizontal.as_deref(), Some("center"));
        assert_eq!(styled.alignment.vertical.as_deref(), Some("top"));
        assert!(styled.alignment.wrap_text);
        assert_eq!(styled.num_format.as_deref(), Some("yyyy-mm-dd"));

        assert_eq!(sheet.styles[2].num_format.as_deref(), Some("#,##0.00"));
    }

    #[test]
    fn detects_temporal_formats() {
        let sheet = load();
        assert_eq!(sheet.number_kind(0), NumberKind::Number);
        assert_eq!(sheet.number_kind(1), NumberKind::Date);
        assert_eq!(sheet.number_kind(2), NumberKind::Number);
        assert_eq!(sheet.number_kind(99), NumberKind::Number);
    }

    #[test]
    fn parses_rgb_attributes() {
        assert_eq!(Rgb::parse("FF00FF00"), Some(Rgb(0x00FF00)));
        assert_eq!(Rgb::parse("123456"), Some(Rgb(0x123456)));
        assert_eq!(Rgb::parse("theme"), None);
        assert_eq!(Rgb::parse("+FFFFF"), None);
        assert_eq!(Rgb::parse("aéééb"), None);
        assert_eq!(Rgb::parse("FFé0000"), None);
    }

    #[test]
    fn ignores_colors_that_are_not_hex() {
        let styles = STYLES.replace("FFFF0000", "aéééb");
        let mut reader = XmlReader::new(Cursor::new(styles.as_bytes()));
        let sheet = load_styles(&mut reader).expect("styles");
        assert_eq!(sheet.styles[1].font.color, None);
        assert!(sheet.styles[1].font.bold);
    }
}
