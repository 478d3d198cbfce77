use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::serialize::Artifact;
use crate::error::ArchiveError;

pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// A finished in-memory zip archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub name: String,
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

/// Builds one archive holding every artifact as a top-level entry, in order.
/// The archive is only returned once the central directory is written.
pub fn build_archive(name: &str, artifacts: &[&Artifact]) -> Result<Archive, ArchiveError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
        writer
            .start_file(artifact.name.as_str(), options)
            .map_err(|source| ArchiveError::Entry {
                archive: name.to_string(),
                entry: artifact.name.clone(),
                source,
            })?;
        writer
            .write_all(&artifact.bytes)
            .map_err(|source| ArchiveError::Write {
                archive: name.to_string(),
                entry: artifact.name.clone(),
                source,
            })?;
        entries.push(artifact.name.clone());
    }

    let cursor = writer.finish().map_err(|source| ArchiveError::Finish {
        archive: name.to_string(),
        source,
    })?;

    Ok(Archive {
        name: name.to_string(),
        bytes: cursor.into_inner(),
        entries,
    })
}

/// One archive for the whole run, or one per artifact named after it.
pub fn build_archives(
    artifacts: &[Artifact],
    archive_name: &str,
    per_group: bool,
) -> Result<Vec<Archive>, ArchiveError> {
    if !per_group {
        let all = artifacts.iter().collect::<Vec<&Artifact>>();
        return Ok(vec![build_archive(archive_name, &all)?]);
    }

    artifacts
        .iter()
        .map(|artifact| build_archive(&format!("{}.zip", artifact.stem()), &[artifact]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use zip::ZipArchive;

    use super::*;
    use crate::pipeline::extract::{DerivedKey, MainReference};

    fn artifact(name: &str, body: &str) -> Artifact {
        Artifact {
            name: name.to_string(),
            bytes: body.as_bytes().to_vec(),
            key: DerivedKey {
                main_reference: MainReference::Extracted(name.to_string()),
                manifest_date: None,
            },
            row_count: 1,
        }
    }

    fn read_entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        (0..archive.len())
            .map(|index| {
                let mut file = archive.by_index(index).expect("entry");
                let mut body = String::new();
                file.read_to_string(&mut body).expect("read entry");
                (file.name().to_string(), body)
            })
            .collect()
    }

    #[test]
    fn entries_keep_artifact_order_and_names() {
        let artifacts = vec![
            artifact("B_2024-01-02.csv", "b"),
            artifact("A.csv", "a"),
        ];
        let archives = build_archives(&artifacts, "split_files.zip", false).expect("archive");

        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].name, "split_files.zip");
        assert_eq!(archives[0].entries, vec!["B_2024-01-02.csv", "A.csv"]);
        assert_eq!(
            read_entries(&archives[0].bytes),
            vec![
                ("B_2024-01-02.csv".to_string(), "b".to_string()),
                ("A.csv".to_string(), "a".to_string())
            ]
        );
    }

    #[test]
    fn per_group_mode_builds_one_archive_per_artifact() {
        let artifacts = vec![artifact("A.csv", "a"), artifact("B.csv", "b")];
        let archives = build_archives(&artifacts, "split_files.zip", true).expect("archives");

        let names = archives
            .iter()
            .map(|archive| archive.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["A.zip", "B.zip"]);
        assert_eq!(read_entries(&archives[1].bytes), vec![("B.csv".to_string(), "b".to_string())]);
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let artifacts = vec![artifact("A.csv", "same"), artifact("B.csv", "body")];
        let first = build_archives(&artifacts, "split_files.zip", false).expect("first");
        let second = build_archives(&artifacts, "split_files.zip", false).expect("second");
        assert_eq!(first[0].bytes, second[0].bytes);
    }

    #[test]
    fn duplicate_entry_names_fail_the_whole_archive() {
        let artifacts = vec![artifact("A.csv", "a"), artifact("A.csv", "b")];
        let err = build_archives(&artifacts, "split_files.zip", false).expect_err("must fail");
        assert!(matches!(err, ArchiveError::Entry { .. }));
    }
}
