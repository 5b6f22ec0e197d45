use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::remote::FileTransfer;

pub const SUMMARIES_CATEGORY: &str = "summaries";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    Transferred,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTransferResult {
    pub file_name: String,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub category: String,
    /// Expected files already present locally before the transfer.
    pub already_present: usize,
    pub results: Vec<FileTransferResult>,
}

impl TransferReport {
    pub fn transferred(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|result| result.outcome == TransferOutcome::Transferred)
            .map(|result| result.file_name.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileTransferResult> {
        self.results
            .iter()
            .filter(|result| matches!(result.outcome, TransferOutcome::Failed { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}

/// Fetches every expected file not yet present in `local_dir`, one at a time.
///
/// A failed file is logged and recorded in the report; the remaining files are still
/// attempted and nothing is retried.
pub fn transfer_missing_files(
    transfer: &dyn FileTransfer,
    category: &str,
    expected: &[String],
    remote_root: &str,
    local_dir: &Path,
) -> Result<TransferReport> {
    fs::create_dir_all(local_dir)?;
    let present: BTreeSet<String> = list_local_files(local_dir)?.into_iter().collect();

    let expected: BTreeSet<&String> = expected.iter().collect();
    let pending: Vec<&String> = expected
        .iter()
        .copied()
        .filter(|name| !present.contains(*name))
        .collect();

    info!(
        category,
        pending = pending.len(),
        already_present = expected.len() - pending.len(),
        "Transferring files"
    );

    let mut results = Vec::with_capacity(pending.len());
    for name in pending {
        let remote_path = format!("{}/{}/{}", remote_root.trim_end_matches('/'), category, name);
        let outcome = match transfer.fetch(&remote_path, local_dir) {
            Ok(()) => {
                info!(file = %name, "Transferred file");
                TransferOutcome::Transferred
            }
            Err(err) => {
                warn!(file = %name, error = %err, "Transfer failed; file left pending");
                TransferOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        results.push(FileTransferResult {
            file_name: name.clone(),
            outcome,
        });
    }

    Ok(TransferReport {
        category: category.to_string(),
        already_present: expected.len() - results.len(),
        results,
    })
}

/// Sorted names of the regular files in `dir`; an absent directory is empty.
pub fn list_local_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
