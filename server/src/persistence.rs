//! Write-behind persistence of session records
//!
//! Gameplay never waits on storage. The session manager hands records to a
//! [`PersistenceQueue`], which is a bounded channel drained by a single
//! worker task. A full queue drops the record with a warning. Gateway
//! failures are logged and never roll anything back.
//!
//! On shutdown the worker stops accepting records, writes whatever is still
//! buffered and then exits.

use crate::error::PersistenceError;
use crate::session::UserId;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use shared::GameResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Final record of a completed game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub session_id: String,
    pub seat_user_ids: Vec<UserId>,
    pub result: GameResult,
    pub final_position_state: String,
    pub move_history: Vec<String>,
    /// Milliseconds since the Unix epoch
    pub ended_at: u64,
}

/// One unit of work for the persistence worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PersistenceRecord {
    SessionCreated {
        session_id: String,
        seat_user_ids: Vec<UserId>,
        created_at: u64,
    },
    SessionResult(GameRecord),
}

impl PersistenceRecord {
    pub fn session_created(session_id: &str, seat_user_ids: Vec<UserId>) -> Self {
        Self::SessionCreated {
            session_id: session_id.to_string(),
            seat_user_ids,
            created_at: unix_millis(SystemTime::now()),
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionCreated { session_id, .. } => session_id,
            Self::SessionResult(record) => &record.session_id,
        }
    }
}

pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Durable storage for session lifecycle records
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn record_session_created(
        &self,
        session_id: &str,
        seat_user_ids: &[UserId],
    ) -> Result<(), PersistenceError>;

    async fn record_session_result(&self, record: &GameRecord) -> Result<(), PersistenceError>;
}

/// Gateway that only logs. Used when no record file is configured.
#[derive(Debug, Default)]
pub struct LogGateway;

#[async_trait]
impl PersistenceGateway for LogGateway {
    async fn record_session_created(
        &self,
        session_id: &str,
        seat_user_ids: &[UserId],
    ) -> Result<(), PersistenceError> {
        info!("Session {} created for {:?}", session_id, seat_user_ids);
        Ok(())
    }

    async fn record_session_result(&self, record: &GameRecord) -> Result<(), PersistenceError> {
        info!(
            "Session {} ended: {} after {} moves",
            record.session_id,
            record.result,
            record.move_history.len()
        );
        Ok(())
    }
}

/// Appends every record as one JSON line and fsyncs after each write.
pub struct JsonLinesGateway {
    file: Mutex<File>,
    path: PathBuf,
}

impl JsonLinesGateway {
    /// Opens `path` in append mode, creating it and its directory if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PersistenceError::io(&path, e))?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &PersistenceRecord) -> Result<(), PersistenceError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for JsonLinesGateway {
    async fn record_session_created(
        &self,
        session_id: &str,
        seat_user_ids: &[UserId],
    ) -> Result<(), PersistenceError> {
        self.append(&PersistenceRecord::session_created(
            session_id,
            seat_user_ids.to_vec(),
        ))
        .await
    }

    async fn record_session_result(&self, record: &GameRecord) -> Result<(), PersistenceError> {
        self.append(&PersistenceRecord::SessionResult(record.clone()))
            .await
    }
}

/// Keeps records in memory. Handy for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    records: Mutex<Vec<PersistenceRecord>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<PersistenceRecord> {
        self.records.lock().await.clone()
    }

    pub async fn results(&self) -> Vec<GameRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter_map(|record| match record {
                PersistenceRecord::SessionResult(result) => Some(result.clone()),
                PersistenceRecord::SessionCreated { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn record_session_created(
        &self,
        session_id: &str,
        seat_user_ids: &[UserId],
    ) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .await
            .push(PersistenceRecord::session_created(
                session_id,
                seat_user_ids.to_vec(),
            ));
        Ok(())
    }

    async fn record_session_result(&self, record: &GameRecord) -> Result<(), PersistenceError> {
        self.records
            .lock()
            .await
            .push(PersistenceRecord::SessionResult(record.clone()));
        Ok(())
    }
}

/// Sending side of the write-behind queue. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<PersistenceRecord>,
}

impl PersistenceQueue {
    /// Hands a record to the worker without waiting
    pub fn submit(&self, record: PersistenceRecord) -> Result<(), PersistenceError> {
        self.sender.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(record) => {
                warn!(
                    "Persistence queue full, dropping record for session {}",
                    record.session_id()
                );
                PersistenceError::QueueFull
            }
            mpsc::error::TrySendError::Closed(record) => {
                warn!(
                    "Persistence worker stopped, dropping record for session {}",
                    record.session_id()
                );
                PersistenceError::Closed
            }
        })
    }
}

/// Owning handle of the worker task
pub struct PersistenceWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<usize>,
}

impl PersistenceWorker {
    /// Starts the worker with a queue of `capacity` records
    pub fn spawn(
        gateway: Arc<dyn PersistenceGateway>,
        capacity: usize,
    ) -> (PersistenceQueue, PersistenceWorker) {
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(gateway, receiver, shutdown_rx));

        (
            PersistenceQueue { sender },
            PersistenceWorker { shutdown, handle },
        )
    }

    /// Closes the queue, drains buffered records and waits for the worker.
    /// Returns how many records were written over the worker's lifetime.
    pub async fn shutdown(self) -> usize {
        let _ = self.shutdown.send(());
        match self.handle.await {
            Ok(written) => {
                info!("Persistence worker drained ({} records written)", written);
                written
            }
            Err(e) => {
                error!("Persistence worker failed: {}", e);
                0
            }
        }
    }
}

async fn run_worker(
    gateway: Arc<dyn PersistenceGateway>,
    mut receiver: mpsc::Receiver<PersistenceRecord>,
    mut shutdown: oneshot::Receiver<()>,
) -> usize {
    let mut written = 0;

    loop {
        tokio::select! {
            record = receiver.recv() => match record {
                Some(record) => written += write(gateway.as_ref(), &record).await,
                None => break,
            },
            _ = &mut shutdown => {
                receiver.close();
                while let Some(record) = receiver.recv().await {
                    written += write(gateway.as_ref(), &record).await;
                }
                break;
            }
        }
    }

    written
}

async fn write(gateway: &dyn PersistenceGateway, record: &PersistenceRecord) -> usize {
    let outcome = match record {
        PersistenceRecord::SessionCreated {
            session_id,
            seat_user_ids,
            ..
        } => gateway.record_session_created(session_id, seat_user_ids).await,
        PersistenceRecord::SessionResult(result) => gateway.record_session_result(result).await,
    };

    match outcome {
        Ok(()) => {
            debug!("Persisted record for session {}", record.session_id());
            1
        }
        Err(e) => {
            error!(
                "Failed to persist record for session {}: {}",
                record.session_id(),
                e
            );
            0
        }
    }
}
