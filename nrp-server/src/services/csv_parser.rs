//! CSV batch parsing
//!
//! The first line is the header row. Every following non-empty line becomes
//! one [`RawRecord`] keyed by header, in file order. Headers and cells are
//! trimmed. A line whose field count differs from the header row fails the
//! whole parse.

use csv::{ReaderBuilder, StringRecord, Trim};

use super::normalizer::RawRecord;

/// Parse CSV text into ordered raw records
pub fn parse_records(text: &str) -> Result<Vec<RawRecord>, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    let mut row = StringRecord::new();
    while reader.read_record(&mut row)? {
        let record: RawRecord = headers
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string))
            .collect();
        records.push(record);
    }

    Ok(records)
}
