use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::config::CompiledConfig;
use crate::error::ExtractionError;

/// Main reference of a record, or the marker for records whose reference
/// could not be derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MainReference {
    Extracted(String),
    Unparsed,
}

impl MainReference {
    pub fn as_extracted(&self) -> Option<&str> {
        match self {
            Self::Extracted(value) => Some(value),
            Self::Unparsed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedKey {
    pub main_reference: MainReference,
    pub manifest_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    Pattern(usize),
    RawField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub value: String,
    pub rule: ExtractionRule,
}

pub struct ReferenceExtractor<'a> {
    patterns: &'a [Regex],
    raw_fallback: bool,
}

impl<'a> ReferenceExtractor<'a> {
    pub fn new(patterns: &'a [Regex], raw_fallback: bool) -> Self {
        Self {
            patterns,
            raw_fallback,
        }
    }

    pub fn from_config(config: &'a CompiledConfig) -> Self {
        Self::new(&config.key_patterns, config.raw_fallback)
    }

    /// Applies the ordered rules to one reference field. `row` is the 1-based
    /// data row used in error reports.
    pub fn extract(&self, raw: &str, row: usize) -> Result<Extracted, ExtractionError> {
        let field = raw.trim();
        if field.is_empty() {
            return Err(ExtractionError::EmptyReference { row });
        }

        for (index, pattern) in self.patterns.iter().enumerate() {
            let Some(captures) = pattern.captures(field) else {
                continue;
            };
            let matched = captures
                .get(1)
                .or_else(|| captures.get(0))
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            if !matched.is_empty() {
                return Ok(Extracted {
                    value: matched.to_string(),
                    rule: ExtractionRule::Pattern(index),
                });
            }
        }

        if self.raw_fallback {
            return Ok(Extracted {
                value: field.to_string(),
                rule: ExtractionRule::RawField,
            });
        }

        Err(ExtractionError::NoMatch {
            row,
            raw: field.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoercedDate {
    Parsed(String),
    Unparsed(String),
    Blank,
}

impl CoercedDate {
    pub fn into_key_component(self) -> Option<String> {
        match self {
            Self::Parsed(value) | Self::Unparsed(value) => Some(value),
            Self::Blank => None,
        }
    }
}

pub struct DateCoercer<'a> {
    input_formats: &'a [String],
    output_format: &'a str,
}

impl<'a> DateCoercer<'a> {
    pub fn new(input_formats: &'a [String], output_format: &'a str) -> Self {
        Self {
            input_formats,
            output_format,
        }
    }

    pub fn from_config(config: &'a CompiledConfig) -> Self {
        Self::new(&config.date_input_formats, &config.canonical_date_format)
    }

    pub fn coerce(&self, raw: &str) -> CoercedDate {
        let value = raw.trim();
        if value.is_empty() {
            return CoercedDate::Blank;
        }

        let leading_token = value.split_whitespace().next().unwrap_or(value);
        let parsed = self
            .parse(value)
            .or_else(|| (leading_token != value).then(|| self.parse(leading_token)).flatten());

        match parsed {
            Some(date) => CoercedDate::Parsed(date.format(self.output_format).to_string()),
            None => CoercedDate::Unparsed(value.to_string()),
        }
    }

    fn parse(&self, value: &str) -> Option<NaiveDate> {
        self.input_formats
            .iter()
            .filter_map(|format| NaiveDate::parse_from_str(value, format).ok())
            .find(|date| (1000..=9999).contains(&date.year()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitConfig;

    fn compiled() -> CompiledConfig {
        SplitConfig::default()
            .compile()
            .expect("default config should compile")
    }

    #[test]
    fn structured_pattern_wins_over_token_rules() {
        let config = compiled();
        let extractor = ReferenceExtractor::from_config(&config);

        let extracted = extractor.extract("ABC123-1", 1).expect("should extract");
        assert_eq!(extracted.value, "ABC123");
        assert_eq!(extracted.rule, ExtractionRule::Pattern(0));

        let extracted = extractor
            .extract("  PO 4471; XYZ999|2 ", 2)
            .expect("should extract");
        assert_eq!(extracted.value, "XYZ999");
    }

    #[test]
    fn token_rules_apply_in_order() {
        let config = compiled();
        let extractor = ReferenceExtractor::from_config(&config);

        let extracted = extractor.extract("12345 678", 1).expect("should extract");
        assert_eq!(extracted.value, "12345");
        assert_eq!(extracted.rule, ExtractionRule::Pattern(1));

        let extracted = extractor.extract(";9-1", 1).expect("should extract");
        assert_eq!(extracted.value, ";9");
        assert_eq!(extracted.rule, ExtractionRule::Pattern(2));
    }

    #[test]
    fn raw_field_is_the_last_resort() {
        let patterns = vec![Regex::new(r"([A-Z]{2,}[0-9]{2,})").expect("regex")];
        let extractor = ReferenceExtractor::new(&patterns, true);

        let extracted = extractor.extract("  a1 b2 ", 7).expect("should extract");
        assert_eq!(extracted.value, "a1 b2");
        assert_eq!(extracted.rule, ExtractionRule::RawField);

        let strict = ReferenceExtractor::new(&patterns, false);
        assert_eq!(
            strict.extract("a1", 7),
            Err(ExtractionError::NoMatch {
                row: 7,
                raw: "a1".to_string()
            })
        );
    }

    #[test]
    fn whitespace_only_reference_is_an_extraction_error() {
        let config = compiled();
        let extractor = ReferenceExtractor::from_config(&config);
        assert_eq!(
            extractor.extract(" \t ", 3),
            Err(ExtractionError::EmptyReference { row: 3 })
        );
    }

    #[test]
    fn every_non_empty_field_yields_a_non_empty_reference() {
        let config = compiled();
        let extractor = ReferenceExtractor::from_config(&config);
        for raw in ["-", "|", ";", "; ;", "x", "--|--", " - ", "AB-12", "é"] {
            let extracted = extractor.extract(raw, 1).expect("non-empty input must extract");
            assert!(!extracted.value.is_empty(), "{raw:?} yielded empty value");
        }
    }

    #[test]
    fn dates_are_rendered_canonically() {
        let config = compiled();
        let coercer = DateCoercer::from_config(&config);

        for raw in [
            "01/02/2024",
            "1/2/24",
            "2024-01-02",
            "2024/01/02",
            "01-02-2024",
            "02-Jan-2024",
            "Jan 02, 2024",
            "January 2, 2024",
            "20240102",
            "2024-01-02 13:45:00",
        ] {
            assert_eq!(
                coercer.coerce(raw),
                CoercedDate::Parsed("2024-01-02".to_string()),
                "{raw}"
            );
        }
    }

    #[test]
    fn unparsable_dates_pass_through() {
        let config = compiled();
        let coercer = DateCoercer::from_config(&config);
        assert_eq!(
            coercer.coerce(" not-a-date "),
            CoercedDate::Unparsed("not-a-date".to_string())
        );
        assert_eq!(coercer.coerce("   "), CoercedDate::Blank);
    }

    #[test]
    fn compact_output_format_is_supported() {
        let formats = vec!["%m/%d/%Y".to_string()];
        let coercer = DateCoercer::new(&formats, "%m%d%y");
        assert_eq!(
            coercer.coerce("01/02/2024"),
            CoercedDate::Parsed("010224".to_string())
        );
    }
}
