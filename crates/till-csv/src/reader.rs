//! Row parser and validator.
//!
//! [`RowReader`] streams a CSV whose first record is the header row and
//! yields one [`ParsedRow`] per data record. Every record becomes a row,
//! including ones the CSV grammar could not decode, so callers can account
//! for each line of the file.

use std::{collections::BTreeMap, io};

use till_core::SourceType;

use crate::{
  Error, Result,
  field::TypedFields,
  mapper::FieldMapper,
  record::SourceRecord,
};

const BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
  Valid(SourceRecord),
  /// Never empty.
  Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
  /// 1-based source line; the header is line 1.
  pub line_number: u64,
  /// Header → cell, padded with empty cells for short records.
  pub raw:         BTreeMap<String, String>,
  /// Logical field → cell, after mapping and defaults.
  pub mapped:      BTreeMap<String, String>,
  pub outcome:     RowOutcome,
}

impl ParsedRow {
  pub fn is_valid(&self) -> bool { matches!(self.outcome, RowOutcome::Valid(_)) }

  /// Validation messages joined into a single anomaly message.
  pub fn error_message(&self) -> Option<String> {
    match &self.outcome {
      RowOutcome::Valid(_) => None,
      RowOutcome::Invalid(errors) => Some(errors.join("; ")),
    }
  }
}

/// Validate one mapped row against the schema of `source_type`.
pub fn classify(source_type: SourceType, mapped: &BTreeMap<String, String>) -> RowOutcome {
  let (typed, mut errors) = TypedFields::resolve(source_type, mapped);
  errors.extend(SourceRecord::cross_check(source_type, &typed));

  if !errors.is_empty() {
    return RowOutcome::Invalid(errors);
  }
  match SourceRecord::build(source_type, &typed) {
    Ok(record) => RowOutcome::Valid(record),
    Err(message) => RowOutcome::Invalid(vec![message]),
  }
}

pub struct RowReader<R> {
  reader:    csv::Reader<R>,
  headers:   Vec<String>,
  mapper:    FieldMapper,
  record:    csv::ByteRecord,
  last_line: u64,
  done:      bool,
}

impl<R: io::Read> RowReader<R> {
  /// Read the header row. A missing or unreadable header is the only
  /// failure; everything after it is reported per row.
  pub fn new(input: R, mapper: FieldMapper) -> Result<Self> {
    let mut reader = csv::ReaderBuilder::new()
      .has_headers(true)
      .flexible(true)
      .trim(csv::Trim::All)
      .from_reader(input);

    let headers: Vec<String> = reader
      .byte_headers()?
      .iter()
      .enumerate()
      .map(|(i, cell)| {
        let cell = String::from_utf8_lossy(cell);
        let cell: &str = if i == 0 { cell.trim_start_matches(BOM) } else { &cell };
        cell.trim().to_owned()
      })
      .collect();

    if headers.iter().all(String::is_empty) {
      return Err(Error::MissingHeader);
    }

    Ok(Self {
      reader,
      headers,
      mapper,
      record: csv::ByteRecord::new(),
      last_line: 1,
      done: false,
    })
  }

  pub fn headers(&self) -> &[String] { &self.headers }

  fn parse_record(&self, line_number: u64) -> ParsedRow {
    let mut raw = BTreeMap::new();
    for (i, header) in self.headers.iter().enumerate() {
      if header.is_empty() {
        continue;
      }
      let cell = self.record.get(i).unwrap_or_default();
      let cell = match std::str::from_utf8(cell) {
        Ok(cell) => cell,
        Err(err) => {
          return malformed(line_number, format!("column {header:?} is not valid UTF-8 ({err})"));
        }
      };
      raw.entry(header.clone()).or_insert_with(|| cell.to_owned());
    }

    let mapped = self.mapper.map(&raw);
    let outcome = classify(self.mapper.source_type(), &mapped);
    ParsedRow { line_number, raw, mapped, outcome }
  }
}

impl<R: io::Read> Iterator for RowReader<R> {
  type Item = ParsedRow;

  fn next(&mut self) -> Option<ParsedRow> {
    if self.done {
      return None;
    }

    match self.reader.read_byte_record(&mut self.record) {
      Ok(true) => {
        let line_number = self
          .record
          .position()
          .map_or(self.last_line + 1, |p| p.line());
        self.last_line = line_number;
        Some(self.parse_record(line_number))
      }
      Ok(false) => {
        self.done = true;
        None
      }
      Err(err) => {
        let line_number = err
          .position()
          .map_or(self.last_line + 1, |p| p.line());
        self.last_line = line_number;
        // The underlying reader failed; nothing after this can be trusted.
        if matches!(err.kind(), csv::ErrorKind::Io(_)) {
          self.done = true;
        }
        Some(malformed(line_number, err.to_string()))
      }
    }
  }
}

fn malformed(line_number: u64, detail: String) -> ParsedRow {
  ParsedRow {
    line_number,
    raw: BTreeMap::new(),
    mapped: BTreeMap::new(),
    outcome: RowOutcome::Invalid(vec![format!("malformed CSV record: {detail}")]),
  }
}
