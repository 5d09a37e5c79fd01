use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::fmt::Display;

/// A typed cell value.
///
/// Values keep the type they had in the source workbook; merging never
/// converts between variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Blank,
    Text(String),
    Number(f64),
    Boolean(bool),
    /// A serial number displayed with a date or time number format,
    /// or an ISO 8601 date cell
    DateTime(NaiveDateTime),
    /// An error literal such as `#N/A`
    Error(String),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Blank => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank => Ok(()),
            Self::Text(value) | Self::Error(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::DateTime(value) if value.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", value.format("%Y-%m-%d"))
            }
            Self::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// A cell of a source table: its value plus an index into the table's styles.
///
/// Style `0` is the workbook default; a blank cell with the default style is
/// indistinguishable from a missing cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: usize,
}

impl Cell {
    pub fn new(value: CellValue, style: usize) -> Self {
        Self { value, style }
    }

    /// True if writing this cell would produce nothing visible.
    pub fn is_empty(&self) -> bool {
        self.value.is_blank() && self.style == 0
    }
}

/// How a number format displays a numeric cell.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum NumberKind {
    #[default]
    Number,
    Date,
    Time,
    DateTime,
}

impl NumberKind {
    pub(crate) fn is_temporal(&self) -> bool {
        !matches!(self, Self::Number)
    }

    /// Classifies a built-in number format id.
    pub(crate) fn from_builtin_id(id: u32) -> Option<Self> {
        match id {
            22 => Some(Self::DateTime),
            14..=17 => Some(Self::Date),
            18..=21 | 45..=47 => Some(Self::Time),
            _ => None,
        }
    }

    /// Classifies a custom number format code by looking for date and time
    /// tokens outside quoted literals, escapes and bracketed sections.
    pub(crate) fn from_format_code(format: &str) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_literal => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time) {
            (true, true) => Self::DateTime,
            (true, false) => Self::Date,
            (false, true) => Self::Time,
            (false, false) => Self::Number,
        }
    }
}

const MILLISECONDS_PER_DAY: f64 = 86_400_000.0;

fn epoch_1900() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("NaiveDate literal")
}

fn first_real_1900_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 3, 1).expect("NaiveDate literal")
}

/// Converts an Excel serial number to a date-time.
///
/// Serials below 60 are shifted by one day to undo the Lotus 1-2-3 leap year
/// bug of the 1900 date system.
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        1_462
    } else if days < 60 {
        1
    } else {
        0
    };
    let date = epoch_1900().checked_add_signed(Duration::try_days(days + offset)?)?;
    let milliseconds = (serial.fract() * MILLISECONDS_PER_DAY).round() as i64;
    date.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::try_milliseconds(milliseconds)?)
}

/// Converts a date-time to a serial number of the 1900 date system.
pub(crate) fn datetime_to_serial(datetime: &NaiveDateTime) -> f64 {
    let epoch = if datetime.date() < first_real_1900_date() {
        epoch_1900() + Duration::days(1)
    } else {
        epoch_1900()
    };
    let elapsed = *datetime - epoch.and_hms_opt(0, 0, 0).expect("midnight");
    elapsed.num_milliseconds() as f64 / MILLISECONDS_PER_DAY
}

/// Parses the value of an ISO 8601 date cell (`t="d"`).
pub(crate) fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim_end_matches('Z');
    if value.contains('T') {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }
}
