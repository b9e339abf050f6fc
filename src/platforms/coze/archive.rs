//! Coze's ZIP export: one YAML workflow document inside an archive.

use crate::error::{GenerateError, ParseError};
use crate::platform::Platform;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

pub const DOCUMENT_NAME: &str = "workflow.yaml";

/// Upper bound on the buffer preallocated from an entry's declared size.
const SIZE_HINT_LIMIT: u64 = 1 << 20;

fn archive_error(message: impl ToString) -> ParseError {
    ParseError::Archive {
        platform: Platform::Coze,
        message: message.to_string(),
    }
}

/// The bytes of the first `.yaml`/`.yml` entry in the archive.
pub fn read_document(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(archive_error)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_ascii_lowercase();
        if !(name.ends_with(".yaml") || name.ends_with(".yml")) {
            continue;
        }
        tracing::debug!(entry = %file.name(), "reading workflow from archive");
        let mut document = Vec::with_capacity(file.size().min(SIZE_HINT_LIMIT) as usize);
        file.read_to_end(&mut document).map_err(archive_error)?;
        return Ok(document);
    }
    Err(archive_error("archive holds no YAML document"))
}

/// Wraps a YAML document in a single-entry archive. Entry timestamps are
/// fixed so equal documents give equal archives.
pub fn write_document(document: &[u8]) -> Result<Vec<u8>, GenerateError> {
    let failed = |e: &dyn std::fmt::Display| GenerateError::Serialize {
        platform: Platform::Coze,
        message: format!("archive: {}", e),
    };
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(DOCUMENT_NAME, options)
        .map_err(|e| failed(&e))?;
    writer.write_all(document).map_err(|e| failed(&e))?;
    let cursor = writer.finish().map_err(|e| failed(&e))?;
    Ok(cursor.into_inner())
}
