use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use super::split::load_input;
use crate::cli::InspectArgs;
use crate::model::{InputSummary, InspectReport, PlannedGroup};
use crate::pipeline::{GroupPlan, artifact_stem, plan_groups};

pub fn run(args: InspectArgs) -> Result<()> {
    let (_, compiled) = args.config.resolve()?;

    let input = load_input(&args.input)?;
    let plan = plan_groups(&input.bytes, input.format, &compiled)
        .with_context(|| format!("failed to inspect {}", args.input.display()))?;

    let report = build_report(
        input.summary(&args.input, plan.counts.rows),
        &plan,
        &compiled.unparsed_group_name,
    );
    info!(
        rows = report.rows,
        groups = report.groups.len(),
        warnings = report.warnings.len(),
        "inspection complete"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        write_json_report(&mut output, &report)?;
    } else {
        write_text_report(&mut output, &report)?;
    }
    output.flush()?;
    Ok(())
}

fn build_report(
    input: InputSummary,
    plan: &GroupPlan,
    unparsed_group_name: &str,
) -> InspectReport {
    let groups = plan
        .groups
        .iter()
        .map(|group| PlannedGroup {
            artifact_stem: artifact_stem(&group.key, unparsed_group_name),
            main_reference: group
                .key
                .main_reference
                .as_extracted()
                .map(ToOwned::to_owned),
            manifest_date: group.key.manifest_date.clone(),
            row_count: group.row_count(),
        })
        .collect();

    InspectReport {
        input,
        schema: plan.schema.summary(),
        rows: plan.counts.rows,
        unparsed_rows: plan.counts.unparsed_rows,
        raw_fallback_rows: plan.counts.raw_fallback_rows,
        date_parse_failures: plan.counts.date_parse_failures,
        groups,
        warnings: plan.warnings.iter().map(ToString::to_string).collect(),
    }
}

fn write_json_report<W: Write>(output: &mut W, report: &InspectReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *output, report)
        .context("failed to serialize inspect json output")?;
    writeln!(output)?;
    Ok(())
}

fn write_text_report<W: Write>(output: &mut W, report: &InspectReport) -> Result<()> {
    writeln!(
        output,
        "Input: {} ({}, {} bytes)",
        report.input.path, report.input.format, report.input.bytes
    )?;
    writeln!(
        output,
        "Columns: reference={} date={}",
        report.schema.reference_column,
        report.schema.date_column.as_deref().unwrap_or("-"),
    )?;
    writeln!(
        output,
        "Rows: {} unparsed={} raw_fallback={} date_failures={}",
        report.rows, report.unparsed_rows, report.raw_fallback_rows, report.date_parse_failures,
    )?;
    writeln!(output, "Groups: {}", report.groups.len())?;
    for group in &report.groups {
        writeln!(output, "  {} rows={}", group.artifact_stem, group.row_count)?;
    }
    if !report.warnings.is_empty() {
        writeln!(output, "Warnings: {}", report.warnings.len())?;
        for warning in &report.warnings {
            writeln!(output, "  {warning}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::cli::ConfigArgs;
    use crate::commands::split::LoadedInput;
    use crate::pipeline::InputFormat;

    const INPUT: &str = "\
Tracking Number,Reference Number(s),Manifest Date
1Z001,ABC123-1,01/02/2024
1Z002,,01/02/2024
1Z003,ABC123-9,someday
";

    fn report_for(config: ConfigArgs) -> InspectReport {
        let (_, compiled) = config.resolve().expect("config");
        let plan = plan_groups(INPUT.as_bytes(), InputFormat::Csv, &compiled).expect("plan");
        let input = LoadedInput {
            bytes: INPUT.as_bytes().to_vec(),
            format: InputFormat::Csv,
        };
        build_report(
            input.summary(Path::new("ups.csv"), plan.counts.rows),
            &plan,
            &compiled.unparsed_group_name,
        )
    }

    #[test]
    fn report_lists_planned_groups_in_first_seen_order() {
        let report = report_for(ConfigArgs::default());

        let stems = report
            .groups
            .iter()
            .map(|group| group.artifact_stem.as_str())
            .collect::<Vec<_>>();
        assert_eq!(stems, vec!["ABC123_2024-01-02", "UNPARSED_2024-01-02", "ABC123_someday"]);
        assert_eq!(report.rows, 3);
        assert_eq!(report.unparsed_rows, 1);
        assert_eq!(report.date_parse_failures, 1);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.groups[1].main_reference, None);
    }

    #[test]
    fn text_report_names_columns_and_groups() {
        let report = report_for(ConfigArgs {
            no_date_key: true,
            ..ConfigArgs::default()
        });

        let mut buffer = Vec::new();
        write_text_report(&mut buffer, &report).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.contains("Columns: reference=Reference Number(s) date=-"));
        assert!(text.contains("Groups: 2"));
        assert!(text.contains("  ABC123 rows=2"));
        assert!(text.contains("  UNPARSED rows=1"));
    }

    #[test]
    fn json_report_is_machine_readable() {
        let report = report_for(ConfigArgs::default());

        let mut buffer = Vec::new();
        write_json_report(&mut buffer, &report).expect("render");
        let value: serde_json::Value = serde_json::from_slice(&buffer).expect("json");

        assert_eq!(value["input"]["format"], "csv");
        assert_eq!(value["groups"][0]["main_reference"], "ABC123");
        assert_eq!(value["groups"][2]["manifest_date"], "someday");
    }

    #[test]
    fn inspect_reads_from_disk_without_writing() {
        let dir = TempDir::new().expect("temp dir");
        let input = dir.path().join("ups.csv");
        fs::write(&input, INPUT).expect("write input");

        run(InspectArgs {
            input,
            config: ConfigArgs::default(),
            json: true,
        })
        .expect("inspect should succeed");

        assert_eq!(fs::read_dir(dir.path()).expect("dir").count(), 1);
    }
}
