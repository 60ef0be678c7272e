use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::StorageError;
use crate::models::{ListingRecord, ListingRow};

/// Write `records` as a comma-delimited file with a header row.
pub fn write_records(path: &Path, records: &[ListingRecord]) -> Result<(), StorageError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(ListingRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `records` to `<dir>/<prefix>_<timestamp>.csv`, creating `dir` if needed.
pub fn persist_timestamped(
    dir: &Path,
    prefix: &str,
    records: &[ListingRecord],
) -> Result<PathBuf, StorageError> {
    std::fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d-%H%M%S-%3f");
    let path = dir.join(format!("{prefix}_{timestamp}.csv"));
    write_records(&path, records)?;
    info!(path = %path.display(), records = records.len(), "Saved listings");
    Ok(path)
}
