//! Append-only inter-agent message logs
//!
//! A log is a directory under `<metadata_dir>/messages/<log name>/` holding
//! one JSON [`Message`] per entry. Ids are assigned per log, start at 1 and
//! increase with every append. Timestamps come from the store and never go
//! backwards within a log, even if the system clock does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use futures::{Stream, TryStreamExt};
use scriptoria_config::types::is_valid_log_name;
use tracing::{debug, info};

use crate::{
    error::FileError,
    guard::WorkspacePath,
    models::Message,
    sequence::SequenceDir,
    store::WorkspaceStore,
};

const MESSAGES_DIR: &str = "messages";

/// Persists and replays message logs
#[derive(Debug, Clone)]
pub struct MessageLog {
    store: Arc<WorkspaceStore>,
    default_log: String,
}

impl MessageLog {
    /// Creates a message log store
    ///
    /// # Arguments
    ///
    /// * `store` - Workspace the logs are kept in
    /// * `default_log` - Log used by [`MessageLog::append`]
    pub fn new(store: Arc<WorkspaceStore>, default_log: impl Into<String>) -> Self {
        MessageLog {
            store,
            default_log: default_log.into(),
        }
    }

    /// Name of the log [`MessageLog::append`] writes to
    pub fn default_log(&self) -> &str {
        &self.default_log
    }

    /// Appends a message to the default log
    pub async fn append(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<Message, FileError> {
        let log = self.default_log.clone();
        self.append_to(&log, sender, recipient, body).await
    }

    /// Appends a message to the named log
    ///
    /// # Returns
    ///
    /// The stored message, carrying its assigned id and timestamp
    pub async fn append_to(
        &self,
        log: &str,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<Message, FileError> {
        if sender.trim().is_empty() || recipient.trim().is_empty() {
            return Err(FileError::InvalidContent(
                "sender and recipient must not be empty".to_string(),
            ));
        }
        self.store.writer().validate_content(body.as_bytes())?;
        let dir = self.log_dir(log).await?;
        let _lock = self.store.locks().acquire(dir.absolute()).await;
        let sequence = SequenceDir::new(dir.absolute());

        let previous = match sequence.highest().await? {
            0 => None,
            id => match sequence.read(id).await? {
                Some(bytes) => Some(decode(log, id, &bytes)?.timestamp),
                None => None,
            },
        };
        let now = Utc::now();
        let timestamp = previous.map_or(now, |previous| previous.max(now));

        let message_for = |id| Message {
            id,
            log: log.to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            timestamp,
            body: body.to_string(),
        };
        let id = sequence
            .append(|id| Ok(serde_json::to_vec(&message_for(id))?))
            .await?;
        info!(log = %log, id, sender = %sender, recipient = %recipient, "Appended message");
        Ok(message_for(id))
    }

    /// Every message of a log in append order
    ///
    /// The stream is lazy, finite and restartable; a log that was never
    /// written yields nothing.
    pub fn read_all(&self, log: &str) -> impl Stream<Item = Result<Message, FileError>> + '_ {
        self.read_since(log, 0)
    }

    /// Messages with an id greater than `after_id`, in append order
    pub fn read_since(
        &self,
        log: &str,
        after_id: u64,
    ) -> impl Stream<Item = Result<Message, FileError>> + '_ {
        let log = log.to_string();
        try_stream! {
            let dir = self.log_dir(&log).await?;
            let sequence = SequenceDir::new(dir.absolute());
            let ids = sequence.numbers().await?;
            debug!(log = %log, after_id, total = ids.len(), "Reading messages");

            for id in ids.into_iter().filter(|id| *id > after_id) {
                if let Some(bytes) = sequence.read(id).await? {
                    yield decode(&log, id, &bytes)?;
                }
            }
        }
    }

    /// Collects [`MessageLog::read_since`], or the whole log when `after_id`
    /// is `None`
    pub async fn read_messages(
        &self,
        log: &str,
        after_id: Option<u64>,
    ) -> Result<Vec<Message>, FileError> {
        self.read_since(log, after_id.unwrap_or(0))
            .try_collect()
            .await
    }

    /// Id of the newest message, 0 for an empty log
    pub async fn last_id(&self, log: &str) -> Result<u64, FileError> {
        let dir = self.log_dir(log).await?;
        SequenceDir::new(dir.absolute()).highest().await
    }

    async fn log_dir(&self, log: &str) -> Result<WorkspacePath, FileError> {
        if !is_valid_log_name(log) {
            return Err(FileError::InvalidLogName(log.to_string()));
        }
        let guard = self.store.guard();
        let relative: PathBuf = Path::new(guard.metadata_dir())
            .join(MESSAGES_DIR)
            .join(log);
        guard.resolve_internal(&relative).await
    }
}

fn decode(log: &str, id: u64, bytes: &[u8]) -> Result<Message, FileError> {
    let message: Message = serde_json::from_slice(bytes)?;
    if message.id != id || message.log != log {
        return Err(FileError::Corrupted(format!(
            "entry {} of log {} holds message {} of log {}",
            id, log, message.id, message.log
        )));
    }
    Ok(message)
}
