use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::auth::gate_for;
use crate::cli::SplitArgs;
use crate::mail::{OutboxSender, deliver_all, prepare_messages, validate_address};
use crate::model::{
    ArchiveEntry, ArtifactEntry, EmailDeliveryEntry, InputSummary, SplitCounts, SplitRunManifest,
};
use crate::pipeline::{ARCHIVE_CONTENT_TYPE, InputFormat, RunOutcome, run_pipeline};
use crate::util::{now_utc_string, sha256_hex, utc_compact_string, write_bytes_atomic, write_json_pretty};

pub struct LoadedInput {
    pub bytes: Vec<u8>,
    pub format: InputFormat,
}

impl LoadedInput {
    pub fn summary(&self, path: &Path, row_count: usize) -> InputSummary {
        InputSummary {
            path: path.display().to_string(),
            format: self.format.as_str().to_string(),
            sha256: sha256_hex(&self.bytes),
            bytes: self.bytes.len(),
            row_count,
        }
    }
}

pub fn load_input(path: &Path) -> Result<LoadedInput> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = InputFormat::detect(path, &bytes);
    info!(path = %path.display(), format = format.as_str(), bytes = bytes.len(), "loaded input");
    Ok(LoadedInput { bytes, format })
}

pub fn run(args: SplitArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let gate = gate_for(args.app_password.as_deref());
    if !gate.authorize(args.password.as_deref().unwrap_or_default()) {
        bail!("access denied: --password (or SHIPSPLIT_PASSWORD) does not match APP_PASSWORD");
    }

    let (config, compiled) = args.config.resolve()?;

    let recipient = match &args.email_to {
        Some(to) => {
            let to = validate_address(to)?;
            let from = args
                .email_from
                .as_deref()
                .context("--email-to requires --email-from or FROM_EMAIL")?;
            Some((validate_address(from)?, to))
        }
        None => None,
    };

    info!(input = %args.input.display(), run_id = %run_id, "starting split");

    let input = load_input(&args.input)?;
    let outcome = run_pipeline(&input.bytes, input.format, &compiled)
        .with_context(|| format!("failed to split {}", args.input.display()))?;

    for warning in outcome.warnings() {
        warn!(warning = %warning, "split warning");
    }

    let archive_paths = if args.dry_run {
        info!(
            archives = outcome.archives.len(),
            artifacts = outcome.artifacts.len(),
            "dry-run: skipping archive writes"
        );
        vec![None; outcome.archives.len()]
    } else {
        write_archives(&args.output_dir, &outcome)?
    };

    let mut delivery_failures = Vec::new();
    let mut email_deliveries = Vec::new();
    if let Some((from, to)) = &recipient {
        if args.dry_run {
            info!(to = %to, "dry-run: skipping email delivery");
        } else {
            let (entries, failures) = send_archives(&args, &outcome, from, to, compiled.archive_per_group)?;
            email_deliveries = entries;
            delivery_failures = failures;
        }
    }

    let counts = SplitCounts::new(
        outcome.counts(),
        outcome.artifacts.len(),
        outcome.archives.len(),
    );
    let manifest = SplitRunManifest {
        manifest_version: 1,
        run_id,
        status: if delivery_failures.is_empty() {
            "completed".to_string()
        } else {
            "completed_with_delivery_errors".to_string()
        },
        started_at,
        updated_at: now_utc_string(),
        dry_run: args.dry_run,
        command: render_split_command(&args),
        input: input.summary(&args.input, outcome.counts().rows),
        schema: outcome.plan.schema.summary(),
        config,
        counts,
        artifacts: artifact_entries(&outcome),
        archives: archive_entries(&outcome, &archive_paths),
        warnings: outcome.warnings().iter().map(ToString::to_string).collect(),
        email_deliveries,
    };

    if args.dry_run {
        info!(
            rows = manifest.counts.rows,
            groups = manifest.counts.groups,
            warnings = manifest.warnings.len(),
            "split dry-run complete"
        );
    } else {
        let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
            args.output_dir
                .join(format!("split_run_{}.json", utc_compact_string(started_ts)))
        });
        write_json_pretty(&manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), "wrote split run manifest");
        info!(
            rows = manifest.counts.rows,
            groups = manifest.counts.groups,
            archives = manifest.counts.archives,
            "split completed"
        );
    }

    if !delivery_failures.is_empty() {
        if args.require_delivery {
            for failure in &delivery_failures {
                error!(error = %failure, "email delivery failed");
            }
            bail!(
                "{} of {} email deliveries failed; archives were kept",
                delivery_failures.len(),
                manifest.email_deliveries.len()
            );
        }
        for failure in &delivery_failures {
            warn!(error = %failure, "email delivery failed");
        }
    }

    Ok(())
}

fn write_archives(output_dir: &Path, outcome: &RunOutcome) -> Result<Vec<Option<PathBuf>>> {
    let mut paths = Vec::with_capacity(outcome.archives.len());
    for archive in &outcome.archives {
        let path = output_dir.join(&archive.name);
        if let Err(err) = write_bytes_atomic(&path, &archive.bytes) {
            remove_written(&paths);
            return Err(err);
        }
        info!(
            path = %path.display(),
            entries = archive.entries.len(),
            bytes = archive.bytes.len(),
            "wrote archive"
        );
        paths.push(Some(path));
    }
    Ok(paths)
}

/// Removes archives from a run whose later writes failed, so the output
/// directory never holds a partial set without a manifest.
fn remove_written(paths: &[Option<PathBuf>]) {
    for path in paths.iter().flatten() {
        match fs::remove_file(path) {
            Ok(()) => warn!(path = %path.display(), "removed archive from failed run"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove archive")
            }
        }
    }
}

fn send_archives(
    args: &SplitArgs,
    outcome: &RunOutcome,
    from: &str,
    to: &str,
    per_group: bool,
) -> Result<(Vec<EmailDeliveryEntry>, Vec<crate::error::EmailDeliveryError>)> {
    let messages = prepare_messages(&outcome.archives, from, to, per_group)?;
    let outbox_dir = args
        .outbox_dir
        .clone()
        .unwrap_or_else(|| args.output_dir.join("outbox"));
    let sender = OutboxSender::new(&outbox_dir);

    let (entries, failures) = deliver_all(&sender, &messages);
    info!(
        to = %to,
        outbox = %outbox_dir.display(),
        sent = entries.len() - failures.len(),
        failed = failures.len(),
        "email delivery finished"
    );
    Ok((entries, failures))
}

fn artifact_entries(outcome: &RunOutcome) -> Vec<ArtifactEntry> {
    outcome
        .artifacts
        .iter()
        .map(|artifact| ArtifactEntry {
            name: artifact.name.clone(),
            main_reference: artifact
                .key
                .main_reference
                .as_extracted()
                .map(ToOwned::to_owned),
            manifest_date: artifact.key.manifest_date.clone(),
            row_count: artifact.row_count,
            bytes: artifact.bytes.len(),
            sha256: sha256_hex(&artifact.bytes),
        })
        .collect()
}

fn archive_entries(outcome: &RunOutcome, paths: &[Option<PathBuf>]) -> Vec<ArchiveEntry> {
    outcome
        .archives
        .iter()
        .zip(paths)
        .map(|(archive, path)| ArchiveEntry {
            name: archive.name.clone(),
            path: path.as_ref().map(|path| path.display().to_string()),
            content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            bytes: archive.bytes.len(),
            sha256: sha256_hex(&archive.bytes),
            entries: archive.entries.clone(),
        })
        .collect()
}

fn render_split_command(args: &SplitArgs) -> String {
    let mut command = vec![
        "shipsplit".to_string(),
        "split".to_string(),
        "--input".to_string(),
        args.input.display().to_string(),
        "--output-dir".to_string(),
        args.output_dir.display().to_string(),
    ];

    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if args.dry_run {
        command.push("--dry-run".to_string());
    }
    args.config.render_flags(&mut command);
    if let Some(to) = &args.email_to {
        command.push("--email-to".to_string());
        command.push(to.clone());
    }
    if let Some(path) = &args.outbox_dir {
        command.push("--outbox-dir".to_string());
        command.push(path.display().to_string());
    }
    if args.require_delivery {
        command.push("--require-delivery".to_string());
    }

    command.join(" ")
}
