use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} pattern '{pattern}': {source}")]
    Pattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("key_extraction_patterns is empty and raw_fallback is disabled")]
    NoExtractionRule,

    #[error("invalid date format '{format}': {reason}")]
    DateFormat { format: String, reason: String },

    #[error("invalid archive name '{0}': must end with .zip and contain no path separator")]
    ArchiveName(String),

    #[error("unparsed_group_name must not be empty")]
    UnparsedGroupName,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("input is empty")]
    Empty,

    #[error("input has no header row")]
    MissingHeader,

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row} has {found} fields but the header has {expected}")]
    RowTooLong {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("failed to open spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet has no worksheets")]
    NoWorksheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Reference,
    ManifestDate,
}

impl ColumnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::ManifestDate => "manifest date",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no {role} column found (headers: {})", .headers.join(", "))]
    MissingColumn {
        role: ColumnRole,
        headers: Vec<String>,
    },

    #[error("several headers match the {role} column: {}", .candidates.join(", "))]
    Ambiguous {
        role: ColumnRole,
        candidates: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("row {row}: reference field is empty")]
    EmptyReference { row: usize },

    #[error("row {row}: no extraction rule matched '{raw}'")]
    NoMatch { row: usize, raw: String },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write CSV for {name}: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush CSV for {name}: {reason}")]
    CsvFlush { name: String, reason: String },

    #[error("failed to write spreadsheet for {name}: {source}")]
    Spreadsheet {
        name: String,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    #[error("{name} exceeds spreadsheet limits ({rows} rows, {columns} columns)")]
    SpreadsheetLimits {
        name: String,
        rows: usize,
        columns: usize,
    },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to add {entry} to {archive}: {source}")]
    Entry {
        archive: String,
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to write {entry} into {archive}: {source}")]
    Write {
        archive: String,
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to finish {archive}: {source}")]
    Finish {
        archive: String,
        #[source]
        source: zip::result::ZipError,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Error)]
pub enum EmailDeliveryError {
    #[error("invalid recipient address '{0}'")]
    InvalidAddress(String),

    #[error("delivery of {attachment} to {to} failed: {diagnostic}")]
    Rejected {
        to: String,
        attachment: String,
        diagnostic: String,
    },
}

/// Non-fatal conditions collected while a run completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunWarning {
    EmptyReference { row: usize },
    UnmatchedReference { row: usize, raw: String },
    DateParse { row: usize, raw: String },
    FilenameCollision { original: String, resolved: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyReference { row } => {
                write!(f, "row {row}: empty reference, routed to the unparsed group")
            }
            Self::UnmatchedReference { row, raw } => write!(
                f,
                "row {row}: reference '{raw}' matched no rule, routed to the unparsed group"
            ),
            Self::DateParse { row, raw } => {
                write!(f, "row {row}: unparsable manifest date '{raw}' kept as-is")
            }
            Self::FilenameCollision { original, resolved } => {
                write!(f, "artifact name {original} already used, wrote {resolved}")
            }
        }
    }
}
