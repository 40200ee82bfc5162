use crate::types::{CanopyError, CanopyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Ledger file name, kept beside the outputs it describes. Hidden so the
/// batch walk never picks it up as an input.
pub const LEDGER_FILE: &str = ".verdant_ledger.json";

/// One completed operation: what produced the output and from which input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub fingerprint: String,
    pub params: String,
    pub completed_at: DateTime<Utc>,
}

/// Skip decision for an output file that already exists on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStatus {
    /// Ledger entry matches the current input and parameters
    Fresh,
    /// Ledger entry exists but input or parameters changed
    Stale,
    /// No ledger entry; the filename convention alone decides
    Unknown,
}

/// Idempotency ledger keyed by `operation:output-name`.
///
/// The filename convention remains the baseline skip mechanism; the ledger
/// only adds stale detection on top of it. It is advisory bookkeeping: a
/// missing or corrupt ledger degrades to filename-only skipping, never to
/// a batch error.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JobLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl JobLedger {
    /// Load the ledger from an output directory, degrading to an empty
    /// ledger (with a warning) if the file is unreadable or corrupt
    pub fn open(dir: &Path) -> JobLedger {
        let path = dir.join(LEDGER_FILE);
        if !path.exists() {
            return JobLedger::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(ledger) => ledger,
                Err(e) => {
                    log::warn!(
                        "Corrupt job ledger {} ({}); falling back to filename skipping",
                        path.display(),
                        e
                    );
                    JobLedger::default()
                }
            },
            Err(e) => {
                log::warn!("Unreadable job ledger {} ({})", path.display(), e);
                JobLedger::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> CanopyResult<()> {
        let path = dir.join(LEDGER_FILE);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CanopyError::Processing(format!("failed to serialize ledger: {}", e)))?;
        std::fs::write(&path, text)?;
        Ok(())
    }

    /// Ledger key for one operation and output file
    pub fn key(operation: &str, output_name: &str) -> String {
        format!("{}:{}", operation, output_name)
    }

    pub fn status(&self, key: &str, fingerprint: &str) -> SkipStatus {
        match self.entries.get(key) {
            Some(entry) if entry.fingerprint == fingerprint => SkipStatus::Fresh,
            Some(_) => SkipStatus::Stale,
            None => SkipStatus::Unknown,
        }
    }

    pub fn record(&mut self, key: String, fingerprint: String, params: String) {
        self.entries.insert(
            key,
            LedgerEntry {
                fingerprint,
                params,
                completed_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 fingerprint over an input file's bytes and the operation
/// parameter string
pub fn fingerprint_input(path: &Path, params: &str) -> CanopyResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hasher.update(params.as_bytes());
    Ok(hex_digest(hasher))
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
