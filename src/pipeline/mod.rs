mod archive;
mod extract;
mod group;
mod read;
mod run;
mod schema;
mod serialize;

pub use archive::{ARCHIVE_CONTENT_TYPE, Archive};
pub use read::InputFormat;
pub use run::{GroupPlan, RunCounts, RunOutcome, plan_groups, run_pipeline};
pub use schema::SchemaSummary;
pub use serialize::artifact_stem;
