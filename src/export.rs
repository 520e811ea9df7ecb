//! Local copies of the exported document.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::shaper::OutputDocument;

/// Errors raised while writing an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Write the document as uploaded.
pub fn write_json(
    document: &OutputDocument,
    path: &Path,
) -> Result<(), ExportError> {
    let bytes = document.to_bytes()?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Write a CSV view of the rows.
///
/// `fields` picks the columns; every row field is written when empty. A
/// field a row does not carry is written empty.
pub fn write_csv<W: Write>(
    document: &OutputDocument,
    fields: &[String],
    writer: W,
) -> Result<(), ExportError> {
    let columns: Vec<&str> = if fields.is_empty() {
        match document.rows().first() {
            Some(row) => row.names().collect(),
            None => return Ok(()),
        }
    } else {
        fields.iter().map(String::as_str).collect()
    };

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&columns)?;
    for row in document.rows() {
        wtr.write_record(
            columns.iter().map(|c| row.get(c).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;

    Ok(())
}

/// [`write_csv`] into a file.
pub fn write_csv_file(
    document: &OutputDocument,
    fields: &[String],
    path: &Path,
) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_csv(document, fields, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawUserRecord;
    use crate::shaper::{AttributeRequest, shape};

    fn document() -> OutputDocument {
        let request = AttributeRequest::new(
            "mail",
            vec!["Title".into(), "Office".into()],
            vec![],
        )
        .unwrap();
        shape(
            &[
                RawUserRecord::new()
                    .with_attribute("mail", "a@x.com")
                    .with_attribute("Title", "Eng, Tools"),
                RawUserRecord::new()
                    .with_attribute("mail", "b@x.com")
                    .with_attribute("Office", "Paris"),
            ],
            &request,
        )
    }

    #[test]
    fn test_csv_all_fields() {
        let mut out = Vec::new();
        write_csv(&document(), &[], &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "idName,Title,Office\na@x.com,\"Eng, Tools\",\nb@x.com,,Paris\n"
        );
    }

    #[test]
    fn test_csv_projection() {
        let mut out = Vec::new();
        let fields = vec!["Office".to_owned(), "idName".to_owned(), "Phone".to_owned()];
        write_csv(&document(), &fields, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Office,idName,Phone\n,a@x.com,\nParis,b@x.com,\n"
        );
    }

    #[test]
    fn test_csv_empty_document() {
        let mut out = Vec::new();
        write_csv(&OutputDocument::default(), &[], &mut out).unwrap();
        assert!(out.is_empty());
    }
}
