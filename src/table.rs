//! Tabular output
//!
//! Flattens extraction records into spreadsheet-shaped tables and writes
//! them as CSV/TSV.

use std::io::Write;

use crate::error::TableError;
use crate::extractor::{FieldValue, Record};

/// Leaf values of a record keyed by dotted column names.
/// Sequence items are numbered from 1: `Cargas[1].Qtd`.
pub fn flatten(record: &Record) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    flatten_into(record, "", &mut out);
    out
}

fn flatten_into(record: &Record, prefix: &str, out: &mut Vec<(String, Option<String>)>) {
    for (name, value) in record.iter() {
        let column = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        };

        match value {
            FieldValue::Text(text) => out.push((column, Some(text.clone()))),
            FieldValue::Absent => out.push((column, None)),
            FieldValue::Group(inner) => flatten_into(inner, &column, out),
            FieldValue::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    flatten_into(item, &format!("{}[{}]", column, i + 1), out);
                }
            }
        }
    }
}

/// CSV writer settings
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Cell text written for absent values
    pub absent: String,
    pub headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            absent: String::new(),
            headers: true,
        }
    }
}

/// Header row plus data rows; `None` cells are absent values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// One row per record. Columns are the union of flattened names in
    /// first-seen order.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        Self::from_flat_rows(records.into_iter().map(flatten).collect())
    }

    /// One row per item of the sequence field `field`, each prefixed with
    /// the record's remaining leaf columns. `None` if `field` is not a
    /// sequence of this record.
    pub fn explode(record: &Record, field: &str) -> Option<Self> {
        let Some(FieldValue::Sequence(items)) = record.get(field) else {
            return None;
        };

        let mut parent = Vec::new();
        for (name, value) in record.iter().filter(|(name, _)| *name != field) {
            let mut single = Vec::new();
            match value {
                FieldValue::Text(text) => single.push((name.to_string(), Some(text.clone()))),
                FieldValue::Absent => single.push((name.to_string(), None)),
                FieldValue::Group(inner) => flatten_into(inner, name, &mut single),
                FieldValue::Sequence(nested) => {
                    for (i, item) in nested.iter().enumerate() {
                        flatten_into(item, &format!("{}[{}]", name, i + 1), &mut single);
                    }
                }
            }
            parent.extend(single);
        }

        if items.is_empty() {
            return Some(Self::from_flat_rows(vec![parent]));
        }

        let rows = items
            .iter()
            .map(|item| {
                let mut row = parent.clone();
                flatten_into(item, field, &mut row);
                row
            })
            .collect();
        Some(Self::from_flat_rows(rows))
    }

    /// Two columns, `field` and `value`, one row per leaf
    pub fn key_value(record: &Record) -> Self {
        Self {
            headers: vec!["field".to_string(), "value".to_string()],
            rows: flatten(record)
                .into_iter()
                .map(|(name, value)| vec![Some(name), value])
                .collect(),
        }
    }

    fn from_flat_rows(flat: Vec<Vec<(String, Option<String>)>>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in &flat {
            for (name, _) in row {
                if !headers.contains(name) {
                    headers.push(name.clone());
                }
            }
        }

        let rows = flat
            .into_iter()
            .map(|row| {
                let mut cells = vec![None; headers.len()];
                for (name, value) in row {
                    if let Some(i) = headers.iter().position(|h| *h == name) {
                        cells[i] = value;
                    }
                }
                cells
            })
            .collect();

        Self { headers, rows }
    }

    pub fn write_csv<W: Write>(&self, writer: W, options: &CsvOptions) -> Result<(), TableError> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .from_writer(writer);

        if options.headers {
            csv_writer.write_record(&self.headers)?;
        }
        for row in &self.rows {
            csv_writer.write_record(
                row.iter()
                    .map(|cell| cell.as_deref().unwrap_or(options.absent.as_str())),
            )?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self, options: &CsvOptions) -> Result<String, TableError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, options)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
