use crate::spreadsheet::cell::CellValue;
use chrono::NaiveDateTime;

/// The comparable form of a reference value.
///
/// Texts compare exactly, numbers by value (`1` equals `1.0` and `-0`
/// equals `0`), and values of different types never match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum MergeKey {
    Text(String),
    Number(u64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    Error(String),
}

impl MergeKey {
    /// `None` for blank values, which never match anything.
    pub(crate) fn from_value(value: &CellValue) -> Option<MergeKey> {
        match value {
            _ if value.is_blank() => None,
            CellValue::Blank => None,
            CellValue::Text(text) => Some(Self::Text(text.to_owned())),
            CellValue::Number(number) if *number == 0.0 => Some(Self::Number(0f64.to_bits())),
            CellValue::Number(number) => Some(Self::Number(number.to_bits())),
            CellValue::Boolean(value) => Some(Self::Boolean(*value)),
            CellValue::DateTime(value) => Some(Self::DateTime(*value)),
            CellValue::Error(error) => Some(Self::Error(error.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: CellValue) -> Option<MergeKey> {
        MergeKey::from_value(&value)
    }

    #[test]
    fn numbers_match_by_value() {
        assert_eq!(key(CellValue::Number(1.0)), key(CellValue::Number(1.0 + 0.0)));
        assert_eq!(key(CellValue::Number(-0.0)), key(CellValue::Number(0.0)));
        assert_ne!(key(CellValue::Number(1.0)), key(CellValue::Number(1.5)));
    }

    #[test]
    fn types_never_match_each_other() {
        assert_ne!(key(CellValue::Number(1.0)), key(CellValue::Text("1".to_owned())));
        assert_ne!(key(CellValue::Boolean(true)), key(CellValue::Number(1.0)));
        assert_ne!(key(CellValue::Text("#N/A".to_owned())), key(CellValue::Error("#N/A".to_owned())));
    }

    #[test]
    fn texts_match_exactly() {
        assert_eq!(key(CellValue::Text("A-1".to_owned())), key(CellValue::Text("A-1".to_owned())));
        assert_ne!(key(CellValue::Text("a-1".to_owned())), key(CellValue::Text("A-1".to_owned())));
        assert_ne!(key(CellValue::Text("A-1 ".to_owned())), key(CellValue::Text("A-1".to_owned())));
    }

    #[test]
    fn blanks_have_no_key() {
        assert_eq!(key(CellValue::Blank), None);
        assert_eq!(key(CellValue::Text(String::new())), None);
    }
}
