use std::collections::HashSet;

use csv::{Terminator, WriterBuilder};
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Workbook, Worksheet, XlsxError};

use super::extract::{DerivedKey, MainReference};
use super::group::Group;
use super::read::Table;
use crate::config::OutputFormat;
use crate::error::{ArtifactError, RunWarning};

pub const SPREADSHEET_SHEET_NAME: &str = "Shipments";
const SPREADSHEET_MAX_ROWS: usize = 1_048_576;
const SPREADSHEET_MAX_COLUMNS: usize = 16_384;
const EMPTY_TEXT_FORMULA: &str = "=\"\"";

/// One serialized group.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
    pub key: DerivedKey,
    pub row_count: usize,
}

impl Artifact {
    pub fn stem(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name)
    }
}

/// Replaces path separators so a key can be used as a flat file name.
pub fn sanitize(value: &str) -> String {
    value.replace(['/', '\\'], "_")
}

pub fn artifact_stem(key: &DerivedKey, unparsed_group_name: &str) -> String {
    let reference = match &key.main_reference {
        MainReference::Extracted(value) => sanitize(value),
        MainReference::Unparsed => sanitize(unparsed_group_name),
    };

    match &key.manifest_date {
        Some(date) => format!("{reference}_{}", sanitize(date)),
        None => reference,
    }
}

/// Hands out artifact names, suffixing later duplicates with `_2`, `_3`, ...
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    pub fn allocate(&mut self, stem: &str, extension: &str) -> (String, Option<RunWarning>) {
        let requested = format!("{stem}.{extension}");
        if self.taken.insert(requested.clone()) {
            return (requested, None);
        }

        let mut suffix = 2_usize;
        loop {
            let candidate = format!("{stem}_{suffix}.{extension}");
            if self.taken.insert(candidate.clone()) {
                let warning = RunWarning::FilenameCollision {
                    original: requested,
                    resolved: candidate.clone(),
                };
                return (candidate, Some(warning));
            }
            suffix += 1;
        }
    }
}

pub fn serialize_groups(
    table: &Table,
    headers: &[String],
    groups: &[Group],
    format: OutputFormat,
    unparsed_group_name: &str,
) -> Result<(Vec<Artifact>, Vec<RunWarning>), ArtifactError> {
    let mut names = NameAllocator::default();
    let mut warnings = Vec::new();
    let mut artifacts = Vec::with_capacity(groups.len());

    for group in groups {
        let stem = artifact_stem(&group.key, unparsed_group_name);
        let (name, collision) = names.allocate(&stem, format.extension());
        warnings.extend(collision);

        let rows = group
            .rows
            .iter()
            .filter_map(|index| table.rows.get(*index))
            .collect::<Vec<&Vec<String>>>();

        let bytes = match format {
            OutputFormat::Csv => render_csv(&name, headers, &rows)?,
            OutputFormat::Spreadsheet => render_spreadsheet(&name, headers, &rows)?,
        };

        artifacts.push(Artifact {
            name,
            bytes,
            key: group.key.clone(),
            row_count: rows.len(),
        });
    }

    Ok((artifacts, warnings))
}

pub fn render_csv(
    name: &str,
    headers: &[String],
    rows: &[&Vec<String>],
) -> Result<Vec<u8>, ArtifactError> {
    let csv_error = |source| ArtifactError::Csv {
        name: name.to_string(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(headers).map_err(csv_error)?;
    for row in rows {
        writer.write_record(row.iter()).map_err(csv_error)?;
    }

    writer.into_inner().map_err(|err| ArtifactError::CsvFlush {
        name: name.to_string(),
        reason: err.error().to_string(),
    })
}

pub fn render_spreadsheet(
    name: &str,
    headers: &[String],
    rows: &[&Vec<String>],
) -> Result<Vec<u8>, ArtifactError> {
    if rows.len() + 1 > SPREADSHEET_MAX_ROWS || headers.len() > SPREADSHEET_MAX_COLUMNS {
        return Err(ArtifactError::SpreadsheetLimits {
            name: name.to_string(),
            rows: rows.len() + 1,
            columns: headers.len(),
        });
    }

    build_workbook(headers, rows).map_err(|source| ArtifactError::Spreadsheet {
        name: name.to_string(),
        source,
    })
}

fn build_workbook(headers: &[String], rows: &[&Vec<String>]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    // Pinned so identical groups produce identical bytes.
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SPREADSHEET_SHEET_NAME)?;
    worksheet.set_formula_result_default("");

    for (col_index, header) in headers.iter().enumerate() {
        write_text_cell(worksheet, 0, col_index as u16, header, true)?;
    }
    for (index, cells) in rows.iter().enumerate() {
        let row_index = index as u32 + 1;
        let blank = cells.iter().all(|cell| cell.is_empty());
        for (col_index, cell) in cells.iter().enumerate() {
            write_text_cell(worksheet, row_index, col_index as u16, cell, blank && col_index == 0)?;
        }
    }

    workbook.save_to_buffer()
}

/// Empty cells are left out of the sheet, and readers drop them. A
/// placeholder `=""` formula with an empty text result is written where a
/// cell must survive anyway: empty headers and the first cell of an
/// all-blank row.
fn write_text_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    keep_if_empty: bool,
) -> Result<(), XlsxError> {
    if !value.is_empty() {
        worksheet.write_string(row, col, value)?;
    } else if keep_if_empty {
        worksheet.write_formula(row, col, EMPTY_TEXT_FORMULA)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(reference: &str, date: Option<&str>) -> DerivedKey {
        DerivedKey {
            main_reference: MainReference::Extracted(reference.to_string()),
            manifest_date: date.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn sanitize_replaces_both_separators_and_is_idempotent() {
        for raw in ["A/B\\C", "plain", "//", "", "a_b", "..\\..//x"] {
            let once = sanitize(raw);
            assert!(!once.contains(['/', '\\']));
            assert_eq!(sanitize(&once), once);
        }
        assert_eq!(sanitize("PO/12\\3"), "PO_12_3");
    }

    #[test]
    fn stem_joins_reference_and_date() {
        assert_eq!(
            artifact_stem(&key("ABC123", Some("2024-01-02")), "UNPARSED"),
            "ABC123_2024-01-02"
        );
        assert_eq!(artifact_stem(&key("A/1", None), "UNPARSED"), "A_1");

        let unparsed = DerivedKey {
            main_reference: MainReference::Unparsed,
            manifest_date: Some("2024-01-02".to_string()),
        };
        assert_eq!(artifact_stem(&unparsed, "UNPARSED"), "UNPARSED_2024-01-02");
    }

    #[test]
    fn later_duplicates_get_numeric_suffixes() {
        let mut names = NameAllocator::default();
        assert_eq!(names.allocate("A_1", "csv"), ("A_1.csv".to_string(), None));

        let (second, warning) = names.allocate("A_1", "csv");
        assert_eq!(second, "A_1_2.csv");
        assert_eq!(
            warning,
            Some(RunWarning::FilenameCollision {
                original: "A_1.csv".to_string(),
                resolved: "A_1_2.csv".to_string(),
            })
        );

        assert_eq!(names.allocate("A_1_2", "csv").0, "A_1_2_2.csv");
        assert_eq!(names.allocate("A_1", "csv").0, "A_1_3.csv");
    }

    #[test]
    fn csv_rendering_quotes_only_when_needed() {
        let headers = vec!["Reference".to_string(), "Note".to_string()];
        let first = vec!["A1".to_string(), "has, comma".to_string()];
        let second = vec!["A1".to_string(), String::new()];

        let bytes = render_csv("A1.csv", &headers, &[&first, &second]).expect("render");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            "Reference,Note\nA1,\"has, comma\"\nA1,\n"
        );
    }

    #[test]
    fn oversized_sheet_is_rejected_before_rendering() {
        let headers = vec!["c".to_string(); SPREADSHEET_MAX_COLUMNS + 1];
        let err = render_spreadsheet("wide.xlsx", &headers, &[]).expect_err("must fail");
        assert!(matches!(err, ArtifactError::SpreadsheetLimits { .. }));
    }
}
