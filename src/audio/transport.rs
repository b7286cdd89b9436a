use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::VoiceError;

/// Evento entregado al bucle del motor.
///
/// Transport callbacks and gateway handlers only ever post one of these; all
/// guild mutation happens after the hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    TrackFinished {
        guild: GuildId,
        token: u64,
        error: Option<String>,
    },
    VoiceDisconnected {
        guild: GuildId,
        channel: Option<ChannelId>,
    },
    VoiceConnected {
        guild: GuildId,
        channel: ChannelId,
    },
}

pub type EngineSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEvents = mpsc::UnboundedReceiver<EngineEvent>;

/// Dónde empieza la reproducción dentro del stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// `-ss` antes de `-i` (seek rápido en la entrada).
    Input(u64),
    /// `-ss` después de `-i` (decodifica y descarta hasta la posición).
    Output(u64),
    None,
}

impl SeekMode {
    /// Estrategias de seek en orden de preferencia.
    pub fn strategies(target: u64) -> [SeekMode; 3] {
        [SeekMode::Input(target), SeekMode::Output(target), SeekMode::None]
    }

    pub fn offset(&self) -> u64 {
        match self {
            SeekMode::Input(t) | SeekMode::Output(t) => *t,
            SeekMode::None => 0,
        }
    }
}

/// Fuente a reproducir.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub url: String,
    pub volume: f32,
    pub seek: SeekMode,
}

impl SourceSpec {
    pub fn new(url: impl Into<String>, volume: u8) -> Self {
        Self {
            url: url.into(),
            volume: f32::from(volume.min(100)) / 100.0,
            seek: SeekMode::None,
        }
    }

    pub fn with_seek(mut self, seek: SeekMode) -> Self {
        self.seek = seek;
        self
    }
}

/// Opciones de ffmpeg para construir la fuente de audio.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub ffmpeg_path: String,
    pub user_agent: String,
}

impl TransportOptions {
    /// Argumentos de ffmpeg: reconexión tolerante, sin stdin, WAV por stdout.
    pub fn ffmpeg_args(&self, spec: &SourceSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
            "5",
            "-reconnect_on_network_error",
            "1",
            "-reconnect_on_http_error",
            "5xx",
            "-nostdin",
            "-user_agent",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.user_agent.clone());

        if let SeekMode::Input(t) = spec.seek {
            args.extend(["-ss".to_string(), t.to_string()]);
        }
        args.extend(["-i".to_string(), spec.url.clone(), "-vn".to_string()]);
        if let SeekMode::Output(t) = spec.seek {
            args.extend(["-ss".to_string(), t.to_string()]);
        }

        args.extend(
            [
                "-fflags",
                "+discardcorrupt",
                "-c:a",
                "pcm_s16le",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-f",
                "wav",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

/// Aviso de fin de track, seguro de llamar desde cualquier hilo.
///
/// Only the first call is forwarded; it never blocks.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: EngineSender,
    guild: GuildId,
    token: u64,
    fired: Arc<AtomicBool>,
}

impl CompletionNotifier {
    pub fn new(tx: EngineSender, guild: GuildId, token: u64) -> Self {
        Self {
            tx,
            guild,
            token,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn notify(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        let event = EngineEvent::TrackFinished {
            guild: self.guild,
            token: self.token,
            error,
        };
        if self.tx.send(event).is_err() {
            debug!("📭 Bucle del motor cerrado, fin de track descartado");
        }
    }
}

/// Transporte de voz: une el bot a canales de voz.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;

    /// Conexión ya establecida por la plataforma (p. ej. tras una auto-reconexión).
    async fn existing(&self, guild: GuildId) -> Option<Arc<dyn VoiceConnection>>;
}

/// Conexión de voz de un guild.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Reproduce `source`, reemplazando cualquier fuente anterior.
    async fn play(&self, source: SourceSpec, on_complete: CompletionNotifier)
        -> Result<(), VoiceError>;

    fn is_connected(&self) -> bool;
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;

    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    fn set_volume(&self, volume: f32);

    async fn disconnect(&self);

    fn channel(&self) -> Option<ChannelId>;
}
