// action-ledger-rs/src/ledger.rs
// Append-only JSON-lines ledger with a SHA-256 hash chain.
//
// Each line is a LedgerEntry. `hash` is SHA-256(prev_hash || canonical JSON of
// `record`), where the canonical form is serde_json's rendering of the record
// as a `Value` (object keys sorted). The first entry chains from GENESIS_HASH.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::record::InteractionRecord;

/// Chain head of an empty ledger.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One line of the ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub prev_hash: String,
    pub hash: String,
    pub record: Value,
}

/// Errors produced by the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("ledger corrupted at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

struct ChainHead {
    sequence: u64,
    hash: String,
}

/// Append-only interaction ledger.
pub struct ActionLedger {
    path: PathBuf,
    head: Mutex<ChainHead>,
}

impl ActionLedger {
    /// Open or create the ledger at `path`.
    ///
    /// An existing file is verified end to end to rebuild the chain head; a
    /// broken chain is an error rather than something to append to.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let head = if path.exists() {
            rebuild_chain_head(&path)?
        } else {
            ChainHead {
                sequence: 0,
                hash: GENESIS_HASH.to_string(),
            }
        };

        tracing::debug!(path = %path.display(), entries = head.sequence, "Opened interaction ledger");

        Ok(Self {
            path,
            head: Mutex::new(head),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far.
    pub fn len(&self) -> Result<u64, LedgerError> {
        let head = self.head.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(head.sequence)
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }

    /// Append one record. Previous lines are never modified.
    pub fn append(&self, record: &InteractionRecord) -> Result<LedgerEntry, LedgerError> {
        let record = serde_json::to_value(record)?;

        let mut head = self.head.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let hash = chain_hash(&head.hash, &record)?;
        let entry = LedgerEntry {
            sequence: head.sequence + 1,
            prev_hash: head.hash.clone(),
            hash,
            record,
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;

        head.sequence = entry.sequence;
        head.hash = entry.hash.clone();

        Ok(entry)
    }

    /// Check every entry of the ledger at `path` and return how many there are.
    pub fn verify(path: impl AsRef<Path>) -> Result<u64, LedgerError> {
        Ok(rebuild_chain_head(path.as_ref())?.sequence)
    }

    /// Read back all records. For audits and tests; the pipeline never reads.
    pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<InteractionRecord>, LedgerError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(&line)?;
            records.push(serde_json::from_value(entry.record)?);
        }
        Ok(records)
    }
}

fn chain_hash(prev_hash: &str, record: &Value) -> Result<String, LedgerError> {
    let canonical = serde_json::to_vec(record)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(&canonical);
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn rebuild_chain_head(path: &Path) -> Result<ChainHead, LedgerError> {
    let reader = BufReader::new(File::open(path)?);
    let mut head = ChainHead {
        sequence: 0,
        hash: GENESIS_HASH.to_string(),
    };

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: LedgerEntry =
            serde_json::from_str(&line).map_err(|e| LedgerError::Corrupted {
                line: line_no,
                reason: format!("unreadable entry: {}", e),
            })?;

        if entry.sequence != head.sequence + 1 {
            return Err(LedgerError::Corrupted {
                line: line_no,
                reason: format!(
                    "expected sequence {}, found {}",
                    head.sequence + 1,
                    entry.sequence
                ),
            });
        }
        if entry.prev_hash != head.hash {
            return Err(LedgerError::Corrupted {
                line: line_no,
                reason: "previous hash does not match chain".to_string(),
            });
        }
        if chain_hash(&entry.prev_hash, &entry.record)? != entry.hash {
            return Err(LedgerError::Corrupted {
                line: line_no,
                reason: "hash mismatch; possible tampering".to_string(),
            });
        }

        head.sequence = entry.sequence;
        head.hash = entry.hash;
    }

    Ok(head)
}
