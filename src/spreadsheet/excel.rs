//! Office Open XML package helpers
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use zip::ZipArchive;

/// XML tag name for relationship elements
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Signature of an OLE compound file. Encrypted packages are stored in one
/// instead of a ZIP archive.
const COMPOUND_FILE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub(crate) type Package = ZipArchive<BufReader<File>>;

/// Opens the ZIP package of a workbook, rejecting encrypted files.
pub(super) fn open(path: &Path) -> Result<Package, SpreadsheetError> {
    let mut reader = BufReader::new(File::open(path)?);
    if is_password_protected(&mut reader)? {
        Err(SpreadsheetError::PasswordProtectedError(path.display().to_string()))?;
    }
    Ok(ZipArchive::new(reader)?)
}

/// Loads the worksheet relationships of a part.
///
/// Returns relationship ids mapped to package paths.
pub(super) fn load_relationships(zip: &mut Package, path: &str) -> Result<HashMap<String, String>, SpreadsheetError> {
    let mut reader = match zip.xml_reader(path)? {
        Some(reader) => reader,
        None => return Ok(HashMap::new()),
    };
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Chart sheets and dialog sheets have no cells
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolves a relationship target against the `xl/` folder.
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

fn is_password_protected<R: Read + Seek>(reader: &mut R) -> Result<bool, SpreadsheetError> {
    let mut signature = [0u8; 8];
    let length = reader.read(&mut signature)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(length == signature.len() && signature == COMPOUND_FILE_SIGNATURE)
}
