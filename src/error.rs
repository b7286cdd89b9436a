use serenity::model::id::GuildId;
use thiserror::Error;

/// Errores del motor de reproducción.
///
/// Fatal outcomes are always guild-scoped: they stop playback for one guild and
/// never propagate past the engine. Stalls are healed silently and are not
/// represented here.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Transient extraction failure; retried with backoff, then the track is skipped.
    #[error("could not resolve a playable stream for {0}")]
    Extraction(String),

    #[error("voice connection lost in guild {0}")]
    ConnectionLost(GuildId),

    /// Persisted snapshot could not be decoded; the entry is discarded.
    #[error("persisted state for guild {guild} is corrupt: {reason}")]
    CorruptState { guild: u64, reason: String },

    #[error("position {position} is out of range (queue has {len} songs)")]
    OutOfRange { position: usize, len: usize },

    #[error("invalid time format '{0}', use formats like '1:30', '90' or '2:15:30'")]
    InvalidTime(String),

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("already seeking, please wait")]
    SeekInProgress,

    #[error("no previous songs in history")]
    NoPreviousSong,

    #[error("metadata lookup failed: {0}")]
    Metadata(String),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errores del transporte de voz.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice connection timed out")]
    Timeout,

    #[error("could not build audio source: {0}")]
    Source(String),

    #[error("voice transport error: {0}")]
    Transport(String),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
