use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// `prev_hash` sentinel for the first record in a log.
pub const GENESIS_HASH: &str = "GENESIS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Payment,
    PaymentFailed,
}

/// Settlement attempt outcome to be recorded.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub r#type: AuditEventType,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub tx_id: Option<String>,
    pub network: String,
}

/// One line of the append-only log.
///
/// `hash` is the SHA-256 digest of the canonical serialization of every
/// other field; `prev_hash` equals the previous record's `hash`, making
/// undetected tampering with history infeasible without recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub r#type: AuditEventType,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    #[serde(rename = "txId")]
    pub tx_id: Option<String>,
    pub network: String,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub hash: String,
}

/// The hashed portion of a record, in canonical field order. Field order
/// must match [`AuditRecord`] minus `hash`.
#[derive(Serialize)]
struct RecordBody<'a> {
    timestamp: &'a DateTime<Utc>,
    r#type: AuditEventType,
    from: &'a str,
    to: &'a str,
    amount: &'a Decimal,
    #[serde(rename = "txId")]
    tx_id: &'a Option<String>,
    network: &'a str,
    #[serde(rename = "prevHash")]
    prev_hash: &'a str,
}

/// Result of a full-chain verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Valid { records: usize },
    Broken { index: usize, reason: String },
}

struct AuditCursor {
    file: tokio::fs::File,
    /// Hash of the most recently written record; avoids re-reading the tail
    /// on every append.
    last_hash: String,
    records: usize,
}

/// Append-only, hash-chained audit log backed by a JSONL file.
///
/// Appends are serialized through a single cursor so the chain never forks;
/// there is no mutate or delete operation. `verify_chain` re-reads the file
/// and recomputes every digest for tamper detection.
pub struct AuditLog {
    path: PathBuf,
    cursor: Mutex<AuditCursor>,
}

impl AuditLog {
    /// Opens or creates the log at `path`, scanning any existing records
    /// once to recover the chain cursor.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut last_hash = GENESIS_HASH.to_string();
        let mut records = 0usize;
        if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            for (index, line) in contents.lines().enumerate() {
                let record: AuditRecord = serde_json::from_str(line).map_err(|e| {
                    PaymentError::internal(format!("corrupt audit record at line {index}: {e}"))
                })?;
                last_hash = record.hash;
                records = index + 1;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), records, "audit log opened");
        Ok(Self {
            path,
            cursor: Mutex::new(AuditCursor {
                file,
                last_hash,
                records,
            }),
        })
    }

    /// Appends one record atomically and returns it.
    ///
    /// The write is a blocking precondition of reporting success upstream:
    /// any failure here surfaces as `AuditWriteFailure`.
    pub async fn append(&self, event: AuditEvent) -> Result<AuditRecord> {
        let mut cursor = self.cursor.lock().await;

        let timestamp = Utc::now();
        let body = RecordBody {
            timestamp: &timestamp,
            r#type: event.r#type,
            from: &event.from,
            to: &event.to,
            amount: &event.amount,
            tx_id: &event.tx_id,
            network: &event.network,
            prev_hash: &cursor.last_hash,
        };
        let hash = hash_body(&body)?;

        let record = AuditRecord {
            timestamp,
            r#type: event.r#type,
            from: event.from,
            to: event.to,
            amount: event.amount,
            tx_id: event.tx_id,
            network: event.network,
            prev_hash: cursor.last_hash.clone(),
            hash,
        };

        let mut line = serde_json::to_string(&record)
            .map_err(|e| PaymentError::AuditWriteFailure(e.to_string()))?;
        line.push('\n');
        cursor
            .file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PaymentError::AuditWriteFailure(e.to_string()))?;
        cursor
            .file
            .flush()
            .await
            .map_err(|e| PaymentError::AuditWriteFailure(e.to_string()))?;

        cursor.last_hash = record.hash.clone();
        cursor.records += 1;
        Ok(record)
    }

    /// Recomputes every record's digest and checks the chain from genesis
    /// to tail.
    pub async fn verify_chain(&self) -> Result<ChainStatus> {
        // Hold the cursor so a concurrent append cannot race the read.
        let _cursor = self.cursor.lock().await;

        let contents = tokio::fs::read_to_string(&self.path).await?;
        let mut expected_prev = GENESIS_HASH.to_string();

        for (index, line) in contents.lines().enumerate() {
            let record: AuditRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    return Ok(ChainStatus::Broken {
                        index,
                        reason: format!("unparsable record: {e}"),
                    });
                }
            };

            if record.prev_hash != expected_prev {
                warn!(index, "audit chain link mismatch");
                return Ok(ChainStatus::Broken {
                    index,
                    reason: "prev_hash does not match previous record".into(),
                });
            }

            let body = RecordBody {
                timestamp: &record.timestamp,
                r#type: record.r#type,
                from: &record.from,
                to: &record.to,
                amount: &record.amount,
                tx_id: &record.tx_id,
                network: &record.network,
                prev_hash: &record.prev_hash,
            };
            if hash_body(&body)? != record.hash {
                warn!(index, "audit record digest mismatch");
                return Ok(ChainStatus::Broken {
                    index,
                    reason: "stored hash does not match recomputed digest".into(),
                });
            }

            expected_prev = record.hash;
        }

        let records = contents.lines().count();
        Ok(ChainStatus::Valid { records })
    }

    /// All records currently on disk, oldest first.
    pub async fn records(&self) -> Result<Vec<AuditRecord>> {
        let _cursor = self.cursor.lock().await;
        let contents = tokio::fs::read_to_string(&self.path).await?;
        contents
            .lines()
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    PaymentError::internal(format!("corrupt audit record at line {index}: {e}"))
                })
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.cursor.lock().await.records
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn hash_body(body: &RecordBody<'_>) -> Result<String> {
    let canonical =
        serde_json::to_string(body).map_err(|e| PaymentError::internal(e.to_string()))?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}
