use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{ChildContainer, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audio::{CompletionNotifier, SourceSpec, TransportOptions, VoiceConnection, VoiceTransport};
use crate::error::VoiceError;

type SharedTrack = Arc<Mutex<Option<ActiveTrack>>>;

/// Transporte de voz sobre songbird.
///
/// Every wrapper handed out for a guild shares that guild's track state, so a
/// connection obtained through [`VoiceTransport::existing`] reports the same
/// playing/paused status as the one that started the track.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    options: TransportOptions,
    tracks: DashMap<GuildId, SharedTrack>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, options: TransportOptions) -> Self {
        Self {
            manager,
            options,
            tracks: DashMap::new(),
        }
    }

    fn wrap(&self, guild: GuildId, call: Arc<tokio::sync::Mutex<Call>>) -> Arc<SongbirdConnection> {
        Arc::new(SongbirdConnection {
            guild,
            call,
            manager: self.manager.clone(),
            options: self.options.clone(),
            track: self.tracks.entry(guild).or_default().clone(),
        })
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        match self.manager.join(guild, channel).await {
            Ok(call) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel, guild);
                Ok(self.wrap(guild, call))
            }
            Err(e) => {
                error!("❌ Error al conectar a voz en guild {}: {:?}", guild, e);
                if let Err(e) = self.manager.remove(guild).await {
                    debug!("Limpieza tras fallo de conexión: {:?}", e);
                }
                Err(match e {
                    JoinError::TimedOut => VoiceError::Timeout,
                    other => VoiceError::Transport(other.to_string()),
                })
            }
        }
    }

    async fn existing(&self, guild: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        let call = self.manager.get(guild)?;
        let connected = call.lock().await.current_connection().is_some();
        connected.then(|| self.wrap(guild, call) as Arc<dyn VoiceConnection>)
    }
}

struct ActiveTrack {
    handle: TrackHandle,
    paused: bool,
    finished: Arc<AtomicBool>,
}

/// Conexión de voz de un guild respaldada por un `Call` de songbird.
pub struct SongbirdConnection {
    guild: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
    options: TransportOptions,
    track: SharedTrack,
}

impl SongbirdConnection {
    /// Lanza ffmpeg y envuelve su salida WAV como entrada de songbird.
    fn spawn_source(&self, source: &SourceSpec) -> Result<Input, VoiceError> {
        let child = Command::new(&self.options.ffmpeg_path)
            .args(self.options.ffmpeg_args(source))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VoiceError::Source(format!("ffmpeg: {}", e)))?;

        Ok(ChildContainer::from(child).into())
    }

    fn live_track<R>(&self, f: impl FnOnce(&ActiveTrack) -> R) -> Option<R> {
        let track = self.track.lock();
        track
            .as_ref()
            .filter(|t| !t.finished.load(Ordering::Acquire))
            .map(f)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, source: SourceSpec, on_complete: CompletionNotifier) -> Result<(), VoiceError> {
        let mut call = self.call.lock().await;
        if call.current_connection().is_none() {
            return Err(VoiceError::Transport("voice connection is not established".into()));
        }

        let input = self.spawn_source(&source)?;
        let handle = call.play_only(Track::from(input).volume(source.volume));
        drop(call);

        let finished = Arc::new(AtomicBool::new(false));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let relay = CompletionRelay {
                guild: self.guild,
                notifier: on_complete.clone(),
                finished: finished.clone(),
            };
            handle
                .add_event(Event::Track(event), relay)
                .map_err(|e| VoiceError::Transport(format!("Error al agregar event handler: {}", e)))?;
        }

        debug!(
            "🎶 Fuente entregada en guild {} (seek {:?}, token {})",
            self.guild,
            source.seek,
            on_complete.token()
        );
        *self.track.lock() = Some(ActiveTrack {
            handle,
            paused: false,
            finished,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if self.manager.get(self.guild).is_none() {
            return false;
        }
        match self.call.try_lock() {
            Ok(call) => call.current_connection().is_some(),
            // Ocupado por otra operación: la conexión sigue registrada.
            Err(_) => true,
        }
    }

    fn is_playing(&self) -> bool {
        self.live_track(|t| !t.paused).unwrap_or(false)
    }

    fn is_paused(&self) -> bool {
        self.live_track(|t| t.paused).unwrap_or(false)
    }

    fn pause(&self) {
        if let Some(track) = self.track.lock().as_mut() {
            let _ = track.handle.pause();
            track.paused = true;
        }
    }

    fn resume(&self) {
        if let Some(track) = self.track.lock().as_mut() {
            let _ = track.handle.play();
            track.paused = false;
        }
    }

    fn stop(&self) {
        if let Some(track) = self.track.lock().take() {
            let _ = track.handle.stop();
        }
    }

    fn set_volume(&self, volume: f32) {
        if let Some(track) = self.track.lock().as_ref() {
            let _ = track.handle.set_volume(volume);
        }
    }

    async fn disconnect(&self) {
        self.stop();
        if let Err(e) = self.manager.remove(self.guild).await {
            warn!("⚠️ Error al salir del canal de voz en guild {}: {:?}", self.guild, e);
        }
    }

    fn channel(&self) -> Option<ChannelId> {
        let call = self.call.try_lock().ok()?;
        call.current_channel().map(|c| ChannelId::new(c.0.get()))
    }
}

/// Reenvía el fin (o error) de un track al motor, una sola vez.
struct CompletionRelay {
    guild: GuildId,
    notifier: CompletionNotifier,
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for CompletionRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        self.finished.store(true, Ordering::Release);

        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };
        if let Some(e) = &error {
            error!("❌ Error en track para guild {}: {}", self.guild, e);
        }

        self.notifier.notify(error);
        None
    }
}
