use tracing::{debug, info, warn};

use super::archive::{Archive, build_archives};
use super::extract::{
    CoercedDate, DateCoercer, DerivedKey, ExtractionRule, MainReference, ReferenceExtractor,
};
use super::group::{Group, group_rows};
use super::read::{InputFormat, Table, read_table};
use super::schema::{Schema, normalize_headers};
use super::serialize::{Artifact, serialize_groups};
use crate::config::{CompiledConfig, EmptyReferencePolicy};
use crate::error::{ExtractionError, PipelineError, RunWarning};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub rows: usize,
    pub groups: usize,
    pub unparsed_rows: usize,
    pub raw_fallback_rows: usize,
    pub date_parse_failures: usize,
    pub filename_collisions: usize,
}

/// Everything up to grouping; shared by `split` and `inspect`.
#[derive(Debug, Clone)]
pub struct GroupPlan {
    pub table: Table,
    pub schema: Schema,
    pub keys: Vec<DerivedKey>,
    pub groups: Vec<Group>,
    pub counts: RunCounts,
    pub warnings: Vec<RunWarning>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: GroupPlan,
    pub artifacts: Vec<Artifact>,
    pub archives: Vec<Archive>,
}

impl RunOutcome {
    pub fn counts(&self) -> RunCounts {
        self.plan.counts
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.plan.warnings
    }
}

/// Runs the whole pipeline over one input. Nothing is shared between calls.
pub fn run_pipeline(
    bytes: &[u8],
    format: InputFormat,
    config: &CompiledConfig,
) -> Result<RunOutcome, PipelineError> {
    let mut plan = plan_groups(bytes, format, config)?;

    let (artifacts, collisions) = serialize_groups(
        &plan.table,
        &plan.schema.headers,
        &plan.groups,
        config.output_format,
        &config.unparsed_group_name,
    )?;
    for collision in &collisions {
        warn!(warning = %collision, "artifact name collision");
    }
    plan.counts.filename_collisions = collisions.len();
    plan.warnings.extend(collisions);

    let archives = build_archives(&artifacts, &config.archive_name, config.archive_per_group)?;

    info!(
        rows = plan.counts.rows,
        groups = plan.counts.groups,
        artifacts = artifacts.len(),
        archives = archives.len(),
        warnings = plan.warnings.len(),
        "pipeline completed"
    );

    Ok(RunOutcome {
        plan,
        artifacts,
        archives,
    })
}

pub fn plan_groups(
    bytes: &[u8],
    format: InputFormat,
    config: &CompiledConfig,
) -> Result<GroupPlan, PipelineError> {
    let table = read_table(bytes, format)?;
    debug!(
        format = format.as_str(),
        columns = table.headers.len(),
        rows = table.row_count(),
        "read input table"
    );

    let schema = normalize_headers(&table.headers, config)?;
    info!(
        reference_column = %schema.reference_column(),
        date_column = %schema.date_column().unwrap_or("<none>"),
        "resolved schema"
    );

    let (keys, counts, warnings) = derive_keys(&table, &schema, config)?;
    let groups = group_rows(&keys);

    let counts = RunCounts {
        groups: groups.len(),
        ..counts
    };
    if counts.unparsed_rows > 0 || counts.date_parse_failures > 0 {
        warn!(
            unparsed_rows = counts.unparsed_rows,
            date_parse_failures = counts.date_parse_failures,
            "some rows could not be fully keyed"
        );
    }

    Ok(GroupPlan {
        table,
        schema,
        keys,
        groups,
        counts,
        warnings,
    })
}

fn derive_keys(
    table: &Table,
    schema: &Schema,
    config: &CompiledConfig,
) -> Result<(Vec<DerivedKey>, RunCounts, Vec<RunWarning>), ExtractionError> {
    let extractor = ReferenceExtractor::from_config(config);
    let dates = DateCoercer::from_config(config);

    let mut counts = RunCounts {
        rows: table.row_count(),
        ..RunCounts::default()
    };
    let mut warnings = Vec::new();
    let mut keys = Vec::with_capacity(table.row_count());

    for (index, row) in table.rows.iter().enumerate() {
        let row_number = index + 1;
        let raw_reference = row.get(schema.reference).map(String::as_str).unwrap_or("");

        let main_reference = match extractor.extract(raw_reference, row_number) {
            Ok(extracted) => {
                if extracted.rule == ExtractionRule::RawField {
                    counts.raw_fallback_rows += 1;
                }
                MainReference::Extracted(extracted.value)
            }
            Err(err @ ExtractionError::EmptyReference { .. })
                if config.empty_reference_policy == EmptyReferencePolicy::Fail =>
            {
                return Err(err);
            }
            Err(err) => {
                counts.unparsed_rows += 1;
                warnings.push(match err {
                    ExtractionError::EmptyReference { row } => RunWarning::EmptyReference { row },
                    ExtractionError::NoMatch { row, raw } => {
                        RunWarning::UnmatchedReference { row, raw }
                    }
                });
                MainReference::Unparsed
            }
        };

        let manifest_date = schema
            .manifest_date
            .and_then(|column| row.get(column))
            .and_then(|raw| match dates.coerce(raw) {
                CoercedDate::Unparsed(value) => {
                    counts.date_parse_failures += 1;
                    warnings.push(RunWarning::DateParse {
                        row: row_number,
                        raw: value.clone(),
                    });
                    Some(value)
                }
                coerced => coerced.into_key_component(),
            });

        keys.push(DerivedKey {
            main_reference,
            manifest_date,
        });
    }

    Ok((keys, counts, warnings))
}
