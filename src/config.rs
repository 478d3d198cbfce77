use std::fs;
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_REFERENCE_COLUMN_PATTERN: &str = "reference";
pub const DEFAULT_DATE_COLUMN_PATTERN: &str = "manifest";
pub const DEFAULT_CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_ARCHIVE_NAME: &str = "split_files.zip";
pub const DEFAULT_UNPARSED_GROUP_NAME: &str = "UNPARSED";

const DEFAULT_PREFERRED_COLUMN_NAMES: &[&str] = &[
    "Reference Number(s)",
    "Reference",
    "Reference 1",
    "Manifest Date",
];

const DEFAULT_KEY_EXTRACTION_PATTERNS: &[&str] = &[
    r"([A-Za-z]{2,}[0-9]{2,})",
    r"^([^\s;]+)",
    r"^([^|-]+)",
];

const DEFAULT_DATE_INPUT_FORMATS: &[&str] = &[
    "%m/%d/%y",
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    #[serde(alias = "xlsx")]
    Spreadsheet,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Spreadsheet => "xlsx",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReferencePolicy {
    #[default]
    Isolate,
    Fail,
}

/// Run configuration as read from a JSON file, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub reference_column_pattern: String,
    pub date_column_pattern: Option<String>,
    pub preferred_column_names: Vec<String>,
    pub key_extraction_patterns: Vec<String>,
    pub raw_fallback: bool,
    pub canonical_date_format: String,
    pub date_input_formats: Vec<String>,
    pub output_format: OutputFormat,
    pub archive_per_group: bool,
    pub archive_name: String,
    pub empty_reference_policy: EmptyReferencePolicy,
    pub unparsed_group_name: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            reference_column_pattern: DEFAULT_REFERENCE_COLUMN_PATTERN.to_string(),
            date_column_pattern: Some(DEFAULT_DATE_COLUMN_PATTERN.to_string()),
            preferred_column_names: to_owned_list(DEFAULT_PREFERRED_COLUMN_NAMES),
            key_extraction_patterns: to_owned_list(DEFAULT_KEY_EXTRACTION_PATTERNS),
            raw_fallback: true,
            canonical_date_format: DEFAULT_CANONICAL_DATE_FORMAT.to_string(),
            date_input_formats: to_owned_list(DEFAULT_DATE_INPUT_FORMATS),
            output_format: OutputFormat::Csv,
            archive_per_group: false,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            empty_reference_policy: EmptyReferencePolicy::Isolate,
            unparsed_group_name: DEFAULT_UNPARSED_GROUP_NAME.to_string(),
        }
    }
}

impl SplitConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn compile(&self) -> Result<CompiledConfig, ConfigError> {
        let reference_column = compile_column_pattern(
            "reference_column_pattern",
            &self.reference_column_pattern,
        )?;
        let date_column = self
            .date_column_pattern
            .as_deref()
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| compile_column_pattern("date_column_pattern", pattern))
            .transpose()?;

        let key_patterns = self
            .key_extraction_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    field: "key_extraction_patterns",
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if key_patterns.is_empty() && !self.raw_fallback {
            return Err(ConfigError::NoExtractionRule);
        }

        validate_strftime(&self.canonical_date_format)?;
        if self.canonical_date_format.contains(['/', '\\']) {
            return Err(ConfigError::DateFormat {
                format: self.canonical_date_format.clone(),
                reason: "output dates become part of file names and must not contain path separators"
                    .to_string(),
            });
        }
        for format in &self.date_input_formats {
            validate_strftime(format)?;
        }

        let archive_name = self.archive_name.trim();
        if !archive_name.to_ascii_lowercase().ends_with(".zip")
            || archive_name.len() <= ".zip".len()
            || archive_name.contains(['/', '\\'])
        {
            return Err(ConfigError::ArchiveName(self.archive_name.clone()));
        }

        let unparsed_group_name = self.unparsed_group_name.trim();
        if unparsed_group_name.is_empty() {
            return Err(ConfigError::UnparsedGroupName);
        }

        Ok(CompiledConfig {
            reference_column,
            date_column,
            preferred_column_names: self
                .preferred_column_names
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            key_patterns,
            raw_fallback: self.raw_fallback,
            canonical_date_format: self.canonical_date_format.clone(),
            date_input_formats: self.date_input_formats.clone(),
            output_format: self.output_format,
            archive_per_group: self.archive_per_group,
            archive_name: archive_name.to_string(),
            empty_reference_policy: self.empty_reference_policy,
            unparsed_group_name: unparsed_group_name.to_string(),
        })
    }
}

/// Validated configuration shared by every pipeline stage of one run.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub reference_column: Regex,
    pub date_column: Option<Regex>,
    pub preferred_column_names: Vec<String>,
    pub key_patterns: Vec<Regex>,
    pub raw_fallback: bool,
    pub canonical_date_format: String,
    pub date_input_formats: Vec<String>,
    pub output_format: OutputFormat,
    pub archive_per_group: bool,
    pub archive_name: String,
    pub empty_reference_policy: EmptyReferencePolicy,
    pub unparsed_group_name: String,
}

fn compile_column_pattern(field: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::Pattern {
            field,
            pattern: pattern.to_string(),
            source,
        })
}

fn validate_strftime(format: &str) -> Result<(), ConfigError> {
    if format.trim().is_empty() {
        return Err(ConfigError::DateFormat {
            format: format.to_string(),
            reason: "format is empty".to_string(),
        });
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::DateFormat {
            format: format.to_string(),
            reason: "unrecognized strftime specifier".to_string(),
        });
    }
    Ok(())
}

fn to_owned_list(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_compiles() {
        let compiled = SplitConfig::default()
            .compile()
            .expect("default config should compile");
        assert_eq!(compiled.key_patterns.len(), 3);
        assert!(compiled.date_column.is_some());
        assert_eq!(compiled.archive_name, "split_files.zip");
        assert!(compiled.reference_column.is_match("REFERENCE NUMBER(S)"));
    }

    #[test]
    fn partial_json_config_keeps_defaults() {
        let raw = r#"{ "output_format": "xlsx", "archive_per_group": true, "date_column_pattern": null }"#;
        let config: SplitConfig = serde_json::from_str(raw).expect("config should parse");
        assert_eq!(config.output_format, OutputFormat::Spreadsheet);
        assert!(config.archive_per_group);
        assert!(config.date_column_pattern.is_none());
        assert_eq!(config.canonical_date_format, "%Y-%m-%d");

        let compiled = config.compile().expect("config should compile");
        assert!(compiled.date_column.is_none());
    }

    #[test]
    fn invalid_extraction_pattern_is_rejected() {
        let config = SplitConfig {
            key_extraction_patterns: vec!["([A-Z".to_string()],
            ..SplitConfig::default()
        };
        let err = config.compile().expect_err("broken regex must fail");
        assert!(matches!(
            err,
            ConfigError::Pattern {
                field: "key_extraction_patterns",
                ..
            }
        ));
    }

    #[test]
    fn date_format_with_separator_is_rejected() {
        let config = SplitConfig {
            canonical_date_format: "%m/%d/%Y".to_string(),
            ..SplitConfig::default()
        };
        assert!(matches!(
            config.compile(),
            Err(ConfigError::DateFormat { .. })
        ));

        let config = SplitConfig {
            canonical_date_format: "%Q".to_string(),
            ..SplitConfig::default()
        };
        assert!(matches!(
            config.compile(),
            Err(ConfigError::DateFormat { .. })
        ));
    }

    #[test]
    fn archive_name_must_be_a_plain_zip_name() {
        for name in ["out.tar", "nested/out.zip", ".zip", ""] {
            let config = SplitConfig {
                archive_name: name.to_string(),
                ..SplitConfig::default()
            };
            assert!(
                matches!(config.compile(), Err(ConfigError::ArchiveName(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn no_rules_at_all_is_rejected() {
        let config = SplitConfig {
            key_extraction_patterns: Vec::new(),
            raw_fallback: false,
            ..SplitConfig::default()
        };
        assert!(matches!(
            config.compile(),
            Err(ConfigError::NoExtractionRule)
        ));
    }
}
