use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::fmt;

use super::song::{LoopMode, Song};

/// Aviso puntual para el canal de texto del guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// El stream de una canción no se pudo obtener y se saltó.
    SongSkipped { title: String },
    /// Demasiados fallos seguidos; la reproducción se detuvo.
    PlaybackHalted,
    /// La reconexión de voz falló.
    ConnectionLost,
    /// El seek no funcionó; `restarted` indica si la canción volvió a empezar.
    SeekFailed { restarted: bool },
}

impl Alert {
    pub fn title(&self) -> &'static str {
        match self {
            Alert::SongSkipped { .. } => "Song Skipped",
            Alert::PlaybackHalted => "Playback Stopped",
            Alert::ConnectionLost => "Voice Connection Lost",
            Alert::SeekFailed { .. } => "Seek Failed",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::SongSkipped { title } => {
                write!(f, "**{}** was skipped (stream unavailable)", title)
            }
            Alert::PlaybackHalted => f.write_str(
                "Too many consecutive song failures. Please check your queue and try again.",
            ),
            Alert::ConnectionLost => f.write_str(
                "Lost connection to the voice channel and could not reconnect. Use the join command to reconnect.",
            ),
            Alert::SeekFailed { restarted: true } => {
                f.write_str("Could not seek, restarted song from beginning")
            }
            Alert::SeekFailed { restarted: false } => {
                f.write_str("Failed to seek and could not recover playback")
            }
        }
    }
}

/// Datos para pintar el mensaje de "now playing".
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingView {
    pub song: Song,
    pub position: u64,
    pub paused: bool,
    pub volume: u8,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub queue_len: usize,
    pub next_title: Option<String>,
}

/// Destino de notificaciones del motor.
///
/// Calls are fire-and-forget from the engine's point of view: failures are
/// logged by the implementation and never change playback state.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Crea (o recrea) el mensaje de estado. Devuelve `true` si quedó publicado.
    async fn show_now_playing(&self, guild: GuildId, channel: ChannelId, view: NowPlayingView)
        -> bool;

    /// Actualiza el mensaje existente con la posición actual.
    async fn refresh_now_playing(&self, guild: GuildId, view: NowPlayingView);

    /// `Some(false)` si el mensaje ya no existe, `None` si no se pudo comprobar.
    async fn now_playing_exists(&self, guild: GuildId) -> Option<bool>;

    /// Retira el mensaje de estado (cola vacía, stop o desconexión).
    async fn clear_now_playing(&self, guild: GuildId);

    async fn alert(&self, guild: GuildId, channel: ChannelId, alert: Alert);
}
