//! Evidence store.
//!
//! Images are written as individual files in one flat directory; their names
//! carry all metadata (see `naming`). The group's best image is also copied to
//! `latest.jpg`, which external readers use as the most recent relevant frame.
//!
//! Retention is a sweep by file modification time. `latest.jpg` is never
//! listed as evidence and never deleted.

pub mod naming;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::classify::DetectionType;
use crate::error::EvidenceError;

pub use naming::{EvidenceName, LATEST_FILE_NAME};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// One persisted evidence image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EvidenceRecord {
    /// `None` for legacy single-image names.
    pub group_id: Option<String>,
    pub sequence_index: Option<u32>,
    pub is_best: bool,
    pub detection_type: DetectionType,
    pub saved_at: DateTime<Utc>,
    pub path: PathBuf,
}

/// Outcome of one retention sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub kept: usize,
    pub failed: usize,
}

pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    /// Open (and create if needed) the evidence directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, EvidenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| EvidenceError::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE_NAME)
    }

    /// Write one image. Best images also replace `latest.jpg`.
    pub fn save(
        &self,
        image: &[u8],
        detection_type: DetectionType,
        group_id: &str,
        is_best: bool,
        sequence_index: Option<u32>,
    ) -> Result<EvidenceRecord, EvidenceError> {
        let file_name = naming::encode(detection_type, is_best, group_id, sequence_index);
        let path = self.dir.join(file_name);
        write_file(&path, image)?;

        // The evidence file is written; a failed latest update is only logged.
        if is_best {
            if let Err(e) = self.replace_latest(image) {
                log::warn!(target: "sentinel::evidence", "latest image not updated: {}", e);
            }
        }

        log::info!(target: "sentinel::evidence", "image saved: {}", path.display());
        Ok(EvidenceRecord {
            group_id: Some(group_id.to_string()),
            sequence_index,
            is_best,
            detection_type,
            saved_at: Utc::now(),
            path,
        })
    }

    // Write-then-rename so readers never see a half-written latest.jpg.
    fn replace_latest(&self, image: &[u8]) -> Result<(), EvidenceError> {
        let staging = self.dir.join(format!("{}.tmp", LATEST_FILE_NAME));
        write_file(&staging, image)?;
        let latest = self.latest_path();
        std::fs::rename(&staging, &latest).map_err(|source| {
            let _ = std::fs::remove_file(&staging);
            EvidenceError::Write {
                path: latest,
                source,
            }
        })
    }

    /// All evidence records, newest first.
    pub fn list(&self) -> Result<Vec<EvidenceRecord>, EvidenceError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| EvidenceError::ReadDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().and_then(naming::decode) else {
                continue;
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let saved_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            records.push(EvidenceRecord {
                group_id: name.group_id,
                sequence_index: name.sequence_index,
                is_best: name.is_best,
                detection_type: name.detection_type,
                saved_at,
                path: entry.path(),
            });
        }

        records.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| b.path.cmp(&a.path)));
        Ok(records)
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<EvidenceRecord>, EvidenceError> {
        let mut records = self.list()?;
        records.truncate(limit);
        Ok(records)
    }

    /// Delete files older than `retention_days`. Zero disables the sweep.
    pub fn sweep(&self, retention_days: u32) -> Result<SweepReport, EvidenceError> {
        if retention_days == 0 {
            return Ok(SweepReport::default());
        }
        let age = Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY);
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.sweep_before(cutoff)
    }

    /// Delete every regular file except `latest.jpg` modified strictly before `cutoff`.
    ///
    /// A file that cannot be inspected or deleted is logged and counted as failed;
    /// the sweep continues with the remaining files.
    pub fn sweep_before(&self, cutoff: SystemTime) -> Result<SweepReport, EvidenceError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| EvidenceError::ReadDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut report = SweepReport::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!(target: "sentinel::evidence", "retention: unreadable entry: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            if entry.file_name() == LATEST_FILE_NAME {
                continue;
            }
            let path = entry.path();
            let modified = match entry.metadata().and_then(|m| {
                if m.is_file() {
                    m.modified().map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!(
                        target: "sentinel::evidence",
                        "retention: cannot stat {}: {}",
                        path.display(),
                        e
                    );
                    report.failed += 1;
                    continue;
                }
            };

            if modified >= cutoff {
                report.kept += 1;
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    log::debug!(target: "sentinel::evidence", "retention: deleted {}", path.display());
                    report.deleted += 1;
                }
                Err(source) => {
                    let err = EvidenceError::Delete { path, source };
                    log::warn!(target: "sentinel::evidence", "retention: {}", err);
                    report.failed += 1;
                }
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            log::info!(
                target: "sentinel::evidence",
                "retention sweep: deleted={} kept={} failed={}",
                report.deleted,
                report.kept,
                report.failed
            );
        }
        Ok(report)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), EvidenceError> {
    std::fs::write(path, bytes).map_err(|source| EvidenceError::Write {
        path: path.to_path_buf(),
        source,
    })
}
