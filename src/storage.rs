//! Daily record store.
//!
//! One CSV file per UTC day. Every append merges the new batch into the file,
//! deduplicates on `(author, content)` (earliest row wins) and rewrites the
//! whole file atomically.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::models::PostRecord;

/// Errors from store reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Counts from one successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendSummary {
    /// Rows in the batch handed to `append`.
    pub submitted: usize,
    /// Rows now in the store.
    pub stored: usize,
    /// Rows the store held before (0 if it was missing or unreadable).
    pub previous: usize,
}

impl AppendSummary {
    /// Rows this append actually added.
    pub fn added(&self) -> usize {
        self.stored.saturating_sub(self.previous)
    }
}

/// Append-and-merge store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    data_dir: PathBuf,
    file_prefix: String,
}

impl RecordStore {
    pub fn new(data_dir: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Store file for a calendar day: `<data_dir>/<prefix>_<YYYYMMDD>.csv`.
    pub fn destination_for(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.csv", self.file_prefix, date.format("%Y%m%d")))
    }

    /// Today's (UTC) store file.
    pub fn today(&self) -> PathBuf {
        self.destination_for(Utc::now().date_naive())
    }

    /// Merge `records` into today's store. Failures are logged with the full batch.
    pub fn append(&self, records: &[PostRecord]) -> Option<AppendSummary> {
        self.append_to(&self.today(), records)
    }

    /// Merge `records` into the store at `destination`.
    ///
    /// Never fails: a write error is logged together with the batch so it can
    /// be recovered by hand, and `None` is returned.
    pub fn append_to(&self, destination: &Path, records: &[PostRecord]) -> Option<AppendSummary> {
        if records.is_empty() {
            return None;
        }

        match merge_into(destination, records) {
            Ok(summary) => {
                info!(
                    "Saved {} posts to {} ({} new, {} total)",
                    summary.submitted,
                    destination.display(),
                    summary.added(),
                    summary.stored
                );
                Some(summary)
            }
            Err(e) => {
                error!("Error saving posts to {}: {}", destination.display(), e);
                error!("Posts that failed to save: {:?}", records);
                None
            }
        }
    }
}

/// Read every row of a store file.
pub fn read_records(path: &Path) -> Result<Vec<PostRecord>, StoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Keep the first row of each `(author, content)` pair and drop rows without content.
pub fn dedup_records(records: Vec<PostRecord>) -> Vec<PostRecord> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(records.len());
        let keep = records
            .iter()
            .map(|r| r.has_content() && seen.insert(r.key()))
            .collect();
        keep
    };
    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, keep)| keep.then_some(record))
        .collect()
}

fn merge_into(destination: &Path, records: &[PostRecord]) -> Result<AppendSummary, StoreError> {
    let existing = if destination.exists() {
        match read_records(destination) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "Error reading existing store {}, starting a new file: {}",
                    destination.display(),
                    e
                );
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    let previous = existing.len();

    let mut combined = existing;
    combined.extend(records.iter().cloned());
    let combined = dedup_records(combined);

    write_atomically(destination, &combined)?;
    debug!("Rewrote {} with {} rows", destination.display(), combined.len());

    Ok(AppendSummary {
        submitted: records.len(),
        stored: combined.len(),
        previous,
    })
}

/// Write to a temporary file beside `destination`, then rename over it.
fn write_atomically(destination: &Path, records: &[PostRecord]) -> Result<(), StoreError> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    temp.as_file_mut().sync_all()?;

    temp.persist(destination).map_err(|e| StoreError::Persist {
        path: destination.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
