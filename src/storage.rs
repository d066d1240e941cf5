use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::MessageId;
use serenity::prelude::TypeMapKey;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::manager::GiveawayManager;
use crate::models::GiveawayRecord;

pub struct GiveawayStorage;

impl TypeMapKey for GiveawayStorage {
    type Value = Arc<GiveawayManager>;
}

// Persistence for giveaway records. Called by the manager on every
// state transition, so restarts pick up where the process left off.
#[async_trait]
pub trait GiveawayStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<GiveawayRecord>>;
    async fn save(&self, record: &GiveawayRecord) -> Result<()>;
    async fn delete(&self, message_id: MessageId) -> Result<()>;
}

// Keeps every record in a single JSON file. Writes go through a
// temporary file and a rename, so a crash never leaves a half-written
// snapshot behind.
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    async fn read_snapshot(&self) -> Result<Vec<GiveawayRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                let message = format!("Can't read the giveaways file: {err}");
                return Err(Error::Storage(message));
            }
        };
        serde_json::from_str(&contents).map_err(|err| {
            let message = format!("Can't parse the giveaways file: {err}");
            Error::Storage(message)
        })
    }

    async fn write_snapshot(&self, records: &[GiveawayRecord]) -> Result<()> {
        let contents = serde_json::to_string_pretty(records).map_err(|err| {
            let message = format!("Can't serialize the giveaways: {err}");
            Error::Storage(message)
        })?;
        let temporary_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temporary_path, contents)
            .await
            .map_err(|err| {
                let message = format!("Can't write the giveaways file: {err}");
                Error::Storage(message)
            })?;
        tokio::fs::rename(&temporary_path, &self.path)
            .await
            .map_err(|err| {
                let message = format!("Can't replace the giveaways file: {err}");
                Error::Storage(message)
            })
    }
}

#[async_trait]
impl GiveawayStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<GiveawayRecord>> {
        let _guard = self.guard.lock().await;
        self.read_snapshot().await
    }

    async fn save(&self, record: &GiveawayRecord) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut records = self.read_snapshot().await?;
        match records
            .iter_mut()
            .find(|existing| existing.message_id == record.message_id)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.write_snapshot(&records).await
    }

    async fn delete(&self, message_id: MessageId) -> Result<()> {
        let _guard = self.guard.lock().await;
        let mut records = self.read_snapshot().await?;
        let before = records.len();
        records.retain(|record| record.message_id != message_id);
        match records.len() == before {
            true => debug!("The giveaway {} was not stored; nothing to delete", message_id),
            false => self.write_snapshot(&records).await?,
        }
        Ok(())
    }
}
