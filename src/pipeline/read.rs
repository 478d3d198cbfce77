use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use csv::ReaderBuilder;
use serde::Serialize;

use crate::error::ReadError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &str = "\u{feff}";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Spreadsheet => "spreadsheet",
        }
    }

    /// Picks the format from the file extension, falling back to sniffing
    /// the leading bytes when the extension is missing or unknown.
    pub fn detect(path: &Path, bytes: &[u8]) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv" | "txt") => Self::Csv,
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Self::Spreadsheet,
            _ if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) => {
                Self::Spreadsheet
            }
            _ => Self::Csv,
        }
    }
}

/// Tabular input with every cell kept as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub fn read_table(bytes: &[u8], format: InputFormat) -> Result<Table, ReadError> {
    if bytes.is_empty() {
        return Err(ReadError::Empty);
    }

    match format {
        InputFormat::Csv => read_csv(bytes),
        InputFormat::Spreadsheet => read_spreadsheet(bytes),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Table, ReadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let mut headers = reader
        .headers()?
        .iter()
        .map(ToOwned::to_owned)
        .collect::<Vec<String>>();
    if let Some(first) = headers.first_mut() {
        if let Some(stripped) = first.strip_prefix(UTF8_BOM) {
            *first = stripped.to_string();
        }
    }
    if headers.iter().all(|header| header.trim().is_empty()) {
        return Err(ReadError::MissingHeader);
    }

    let width = headers.len();
    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > width {
            return Err(ReadError::RowTooLong {
                row: index + 1,
                found: record.len(),
                expected: width,
            });
        }

        let mut row = record.iter().map(ToOwned::to_owned).collect::<Vec<String>>();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Table, ReadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ReadError::NoWorksheet)??;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|cells| cells.iter().map(cell_text).collect::<Vec<String>>())
        .ok_or(ReadError::MissingHeader)?;
    if headers.iter().all(|header| header.trim().is_empty()) {
        return Err(ReadError::MissingHeader);
    }

    let width = headers.len();
    let rows = rows
        .map(|cells| {
            let mut row = cells.iter().map(cell_text).collect::<Vec<String>>();
            row.resize(width, String::new());
            row
        })
        .collect();

    Ok(Table { headers, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(timestamp) if timestamp.time() == chrono::NaiveTime::MIN => {
                timestamp.format("%Y-%m-%d").to_string()
            }
            Some(timestamp) => timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => value.as_f64().to_string(),
        },
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Error(value) => value.to_string(),
    }
}
