//! Zip container assembly for generated artifacts

use crate::error::DispatchError;
use crate::types::Attachment;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Pack attachments into an in-memory zip archive, entries in input order.
pub fn build_archive(attachments: &[Attachment]) -> Result<Vec<u8>, DispatchError> {
    let generated = attachments.len();
    let fail = |e: &dyn std::fmt::Display| DispatchError::ArchiveFailed {
        reason: e.to_string(),
        generated,
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for attachment in attachments {
        writer
            .start_file(&attachment.filename, options)
            .map_err(|e| fail(&e))?;
        writer.write_all(&attachment.bytes).map_err(|e| fail(&e))?;
    }

    let cursor = writer.finish().map_err(|e| fail(&e))?;
    Ok(cursor.into_inner())
}
