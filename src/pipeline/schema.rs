use regex::Regex;
use serde::Serialize;

use crate::config::CompiledConfig;
use crate::error::{ColumnRole, SchemaError};

/// Column positions of the canonical roles within the normalized headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub headers: Vec<String>,
    pub reference: usize,
    pub manifest_date: Option<usize>,
}

impl Schema {
    pub fn reference_column(&self) -> &str {
        self.headers
            .get(self.reference)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn date_column(&self) -> Option<&str> {
        self.manifest_date
            .and_then(|index| self.headers.get(index))
            .map(String::as_str)
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            reference_column: self.reference_column().to_string(),
            date_column: self.date_column().map(ToOwned::to_owned),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub reference_column: String,
    pub date_column: Option<String>,
}

pub fn normalize_headers(raw: &[String], config: &CompiledConfig) -> Result<Schema, SchemaError> {
    let headers = raw
        .iter()
        .map(|header| header.trim().to_string())
        .collect::<Vec<String>>();

    let reference_candidates = matching_columns(&headers, &config.reference_column, &[]);
    let reference = resolve_role(
        ColumnRole::Reference,
        &headers,
        &reference_candidates,
        &config.preferred_column_names,
    )?
    .ok_or_else(|| SchemaError::MissingColumn {
        role: ColumnRole::Reference,
        headers: headers.clone(),
    })?;

    let manifest_date = match &config.date_column {
        Some(pattern) => {
            let candidates = matching_columns(&headers, pattern, &reference_candidates);
            resolve_role(
                ColumnRole::ManifestDate,
                &headers,
                &candidates,
                &config.preferred_column_names,
            )?
        }
        None => None,
    };

    Ok(Schema {
        headers,
        reference,
        manifest_date,
    })
}

fn matching_columns(headers: &[String], pattern: &Regex, exclude: &[usize]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(index, header)| !exclude.contains(index) && pattern.is_match(header))
        .map(|(index, _)| index)
        .collect()
}

fn resolve_role(
    role: ColumnRole,
    headers: &[String],
    candidates: &[usize],
    preferred_names: &[String],
) -> Result<Option<usize>, SchemaError> {
    match candidates {
        [] => Ok(None),
        [only] => Ok(Some(*only)),
        _ => {
            for preferred in preferred_names {
                let exact = candidates
                    .iter()
                    .copied()
                    .filter(|index| {
                        headers
                            .get(*index)
                            .is_some_and(|header| header.eq_ignore_ascii_case(preferred))
                    })
                    .collect::<Vec<usize>>();
                if let [winner] = exact.as_slice() {
                    return Ok(Some(*winner));
                }
            }

            Err(SchemaError::Ambiguous {
                role,
                candidates: candidates
                    .iter()
                    .filter_map(|index| headers.get(*index).cloned())
                    .collect(),
            })
        }
    }
}
