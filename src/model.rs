use serde::Serialize;

use crate::config::SplitConfig;
use crate::pipeline::{RunCounts, SchemaSummary};

#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    pub path: String,
    pub format: String,
    pub sha256: String,
    pub bytes: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitCounts {
    pub rows: usize,
    pub groups: usize,
    pub artifacts: usize,
    pub archives: usize,
    pub unparsed_rows: usize,
    pub raw_fallback_rows: usize,
    pub date_parse_failures: usize,
    pub filename_collisions: usize,
}

impl SplitCounts {
    pub fn new(counts: RunCounts, artifacts: usize, archives: usize) -> Self {
        Self {
            rows: counts.rows,
            groups: counts.groups,
            artifacts,
            archives,
            unparsed_rows: counts.unparsed_rows,
            raw_fallback_rows: counts.raw_fallback_rows,
            date_parse_failures: counts.date_parse_failures,
            filename_collisions: counts.filename_collisions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub main_reference: Option<String>,
    pub manifest_date: Option<String>,
    pub row_count: usize,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: Option<String>,
    pub content_type: String,
    pub bytes: usize,
    pub sha256: String,
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailDeliveryEntry {
    pub to: String,
    pub subject: String,
    pub attachment_name: String,
    pub delivered: bool,
    pub diagnostic: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub dry_run: bool,
    pub command: String,
    pub input: InputSummary,
    pub schema: SchemaSummary,
    pub config: SplitConfig,
    pub counts: SplitCounts,
    pub artifacts: Vec<ArtifactEntry>,
    pub archives: Vec<ArchiveEntry>,
    pub warnings: Vec<String>,
    pub email_deliveries: Vec<EmailDeliveryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedGroup {
    pub artifact_stem: String,
    pub main_reference: Option<String>,
    pub manifest_date: Option<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub input: InputSummary,
    pub schema: SchemaSummary,
    pub rows: usize,
    pub unparsed_rows: usize,
    pub raw_fallback_rows: usize,
    pub date_parse_failures: usize,
    pub groups: Vec<PlannedGroup>,
    pub warnings: Vec<String>,
}
