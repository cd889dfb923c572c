use crate::domain::model::Record;
use crate::utils::error::{EtlError, Result};
use serde::Serialize;

/// CSV with a header row of `fields`; absent fields are written empty.
pub fn write_csv(records: &[Record], fields: &[&str]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(fields)?;
    for record in records {
        writer.write_record(fields.iter().map(|field| record.text(field)))?;
    }

    writer.flush()?;
    writer.into_inner().map_err(|e| {
        EtlError::IoError(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })
}

/// Rows of a headed CSV as records keyed by column name. Rows the reader
/// cannot decode are skipped.
pub fn read_csv(data: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("⚠️ Skipping unreadable CSV row {}: {}", line + 2, e);
                continue;
            }
        };

        let mut record = Record::new();
        for (name, value) in headers.iter().zip(row.iter()) {
            record.set(name.trim(), value);
        }
        records.push(record);
    }

    Ok(records)
}

/// Two-space indented JSON; non-ASCII text is kept as is.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}
