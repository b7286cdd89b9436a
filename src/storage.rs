use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::audio::song::{LoopMode, Song};
use crate::error::{PlayerError, PlayerResult};

/// Snapshot persistido de la cola de un guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub guild_id: u64,
    #[serde(default)]
    pub queue: Vec<Song>,
    #[serde(default)]
    pub loop_backup: Vec<Song>,
    #[serde(default)]
    pub history: Vec<Song>,
    #[serde(default)]
    pub history_position: Option<usize>,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub text_channel: Option<u64>,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

fn default_volume() -> u8 {
    100
}

impl QueueSnapshot {
    pub fn has_content(&self) -> bool {
        !self.queue.is_empty() || !self.loop_backup.is_empty()
    }
}

/// Almacenamiento durable de snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &QueueSnapshot) -> PlayerResult<()>;

    /// `Err(CorruptState)` si el archivo existe pero no se puede decodificar.
    async fn load_snapshot(&self, guild_id: u64) -> PlayerResult<Option<QueueSnapshot>>;

    /// Todos los snapshots legibles; los corruptos se registran y se omiten.
    async fn load_all(&self) -> PlayerResult<Vec<QueueSnapshot>>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    queues_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: &Path) -> PlayerResult<Self> {
        let queues_dir = data_dir.join("queues");
        fs::create_dir_all(&queues_dir).await?;
        info!("📁 Storage inicializado en: {}", queues_dir.display());
        Ok(Self { queues_dir })
    }

    fn file_path(&self, guild_id: u64) -> PathBuf {
        self.queues_dir.join(format!("guild_{}.json", guild_id))
    }

    fn guild_of(path: &Path) -> Option<u64> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return None;
        }
        path.file_stem()?
            .to_str()?
            .strip_prefix("guild_")?
            .parse()
            .ok()
    }

    /// Obtiene estadísticas de almacenamiento
    pub async fn stats(&self) -> PlayerResult<StorageStats> {
        let mut files = fs::read_dir(&self.queues_dir).await?;
        let mut snapshots = 0;
        let mut total_size_bytes = 0;

        while let Some(entry) = files.next_entry().await? {
            if Self::guild_of(&entry.path()).is_some() {
                snapshots += 1;
                if let Ok(metadata) = entry.metadata().await {
                    total_size_bytes += metadata.len();
                }
            }
        }

        Ok(StorageStats {
            snapshots,
            total_size_bytes,
            queues_dir: self.queues_dir.clone(),
        })
    }
}

#[async_trait]
impl SnapshotStore for JsonStorage {
    async fn save_snapshot(&self, snapshot: &QueueSnapshot) -> PlayerResult<()> {
        let path = self.file_path(snapshot.guild_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(snapshot)?;

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        debug!(
            "💾 Cola guardada para guild {} ({} canciones)",
            snapshot.guild_id,
            snapshot.queue.len()
        );
        Ok(())
    }

    async fn load_snapshot(&self, guild_id: u64) -> PlayerResult<Option<QueueSnapshot>> {
        let content = match fs::read(self.file_path(guild_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut snapshot: QueueSnapshot =
            serde_json::from_slice(&content).map_err(|e| PlayerError::CorruptState {
                guild: guild_id,
                reason: e.to_string(),
            })?;
        snapshot.guild_id = guild_id;
        Ok(Some(snapshot))
    }

    async fn load_all(&self) -> PlayerResult<Vec<QueueSnapshot>> {
        let mut files = fs::read_dir(&self.queues_dir).await?;
        let mut snapshots = Vec::new();

        while let Some(entry) = files.next_entry().await? {
            let Some(guild_id) = Self::guild_of(&entry.path()) else {
                continue;
            };
            match self.load_snapshot(guild_id).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(e) => warn!("⚠️ Snapshot ignorado para guild {}: {}", guild_id, e),
            }
        }

        if !snapshots.is_empty() {
            info!("📂 Cargados {} snapshots de cola", snapshots.len());
        }
        Ok(snapshots)
    }
}

/// Estadísticas de almacenamiento
#[derive(Debug)]
pub struct StorageStats {
    pub snapshots: usize,
    pub total_size_bytes: u64,
    pub queues_dir: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage: {} snapshots, {:.2} KB en {}",
            self.snapshots,
            self.total_size_bytes as f64 / 1024.0,
            self.queues_dir.display()
        )
    }
}
