use chrono::Utc;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::notify::{Alert, NotificationSink, NowPlayingView};
use super::song::Song;
use super::state::{GuildSlot, GuildState};
use super::transport::{EngineEvent, EngineEvents, EngineSender, VoiceTransport};
use crate::cache::SongCache;
use crate::config::EngineSettings;
use crate::sources::{Extractor, StreamValidator};
use crate::storage::{QueueSnapshot, SnapshotStore};

/// Colaboradores externos del motor.
pub struct EngineDeps {
    pub extractor: Arc<dyn Extractor>,
    pub validator: Arc<dyn StreamValidator>,
    pub transport: Arc<dyn VoiceTransport>,
    pub store: Arc<dyn SnapshotStore>,
    pub notifier: Arc<dyn NotificationSink>,
}

pub(crate) struct EngineInner {
    pub settings: EngineSettings,
    pub guilds: DashMap<GuildId, Arc<GuildSlot>>,
    pub cache: SongCache,
    pub extractor: Arc<dyn Extractor>,
    pub validator: Arc<dyn StreamValidator>,
    pub transport: Arc<dyn VoiceTransport>,
    pub store: Arc<dyn SnapshotStore>,
    pub notifier: Arc<dyn NotificationSink>,
    pub events: EngineSender,
    /// Guilds con una actualización de "now playing" en curso.
    pub update_locks: DashMap<GuildId, Instant>,
    /// Última comprobación de existencia del mensaje: (existe, cuándo).
    pub message_validations: DashMap<GuildId, (bool, Instant)>,
    restored: AtomicBool,
}

/// Motor de reproducción por guild.
///
/// Cheap to clone; every clone drives the same guild map. Guilds are fully
/// independent: the only lock shared by transitions is each guild's own
/// `play_lock`.
#[derive(Clone)]
pub struct MusicEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl MusicEngine {
    pub fn new(settings: EngineSettings, deps: EngineDeps) -> (Self, EngineEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cache = SongCache::new(settings.max_cache_size, settings.cache_ttl);
        let inner = EngineInner {
            settings,
            guilds: DashMap::new(),
            cache,
            extractor: deps.extractor,
            validator: deps.validator,
            transport: deps.transport,
            store: deps.store,
            notifier: deps.notifier,
            events: tx,
            update_locks: DashMap::new(),
            message_validations: DashMap::new(),
            restored: AtomicBool::new(false),
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &SongCache {
        &self.inner.cache
    }

    /// Canal para publicar eventos de la plataforma (voz conectada/perdida).
    pub fn event_sender(&self) -> EngineSender {
        self.inner.events.clone()
    }

    /// Slot del guild, creado al primer acceso.
    pub(crate) fn slot(&self, guild: GuildId) -> Arc<GuildSlot> {
        self.inner
            .guilds
            .entry(guild)
            .or_insert_with(|| {
                debug!("🆕 Estado creado para guild {}", guild);
                Arc::new(GuildSlot::new(
                    GuildState::new(
                        guild,
                        self.inner.settings.max_history_size,
                        self.inner.settings.default_volume,
                    ),
                    self.inner.settings.save_debounce,
                ))
            })
            .clone()
    }

    pub(crate) fn existing_slot(&self, guild: GuildId) -> Option<Arc<GuildSlot>> {
        self.inner.guilds.get(&guild).map(|s| s.clone())
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.inner.guilds.iter().map(|e| *e.key()).collect()
    }

    /// Arranca el bucle que despacha los eventos del motor.
    ///
    /// Each event is handled on its own task; transitions for the same guild
    /// still serialize on that guild's `play_lock`.
    pub fn spawn_event_loop(&self, mut events: EngineEvents, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            info!("🔄 Bucle de eventos del motor iniciado");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let engine = engine.clone();
                        tokio::spawn(async move { engine.handle_event(event).await });
                    }
                }
            }
            info!("🛑 Bucle de eventos del motor detenido");
        })
    }

    pub async fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::TrackFinished { guild, token, error } => {
                self.on_track_finished(guild, token, error).await;
            }
            EngineEvent::VoiceDisconnected { guild, channel } => {
                self.on_voice_disconnected(guild, channel).await;
            }
            EngineEvent::VoiceConnected { guild, channel } => {
                self.on_voice_connected(guild, channel).await;
            }
        }
    }

    /// Snapshot actual del guild. La canción en curso va al frente de la cola.
    pub fn snapshot(&self, guild: GuildId) -> Option<QueueSnapshot> {
        let slot = self.existing_slot(guild)?;
        let state = slot.state.lock();

        let mut queue: Vec<Song> = state.queue.current().cloned().into_iter().collect();
        queue.extend(state.queue.items().iter().cloned());

        Some(QueueSnapshot {
            guild_id: guild.get(),
            queue,
            loop_backup: state.queue.loop_backup().to_vec(),
            history: state.queue.history().to_vec(),
            history_position: Some(state.queue.history_position()),
            loop_mode: state.queue.loop_mode(),
            shuffle: state.queue.is_shuffle(),
            volume: state.volume,
            text_channel: state.text_channel.map(|c| c.get()),
            saved_at: Utc::now(),
        })
    }

    async fn save_now(&self, guild: GuildId) {
        let Some(snapshot) = self.snapshot(guild) else {
            return;
        };
        if let Err(e) = self.inner.store.save_snapshot(&snapshot).await {
            error!("❌ Error guardando la cola del guild {}: {}", guild, e);
        }
    }

    /// Guarda con debounce: solo la última petición de una ráfaga escribe.
    pub(crate) fn persist(&self, guild: GuildId) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };
        let engine = self.clone();
        slot.saver
            .schedule(move || async move { engine.save_now(guild).await });
    }

    /// Guarda inmediatamente, cancelando cualquier guardado pendiente.
    pub(crate) async fn persist_now(&self, guild: GuildId) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };
        slot.saver.run_now(self.save_now(guild)).await;
    }

    /// Restaura los snapshots guardados. Solo tiene efecto la primera vez.
    pub async fn restore_snapshots(&self) -> usize {
        if self.inner.restored.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let snapshots = match self.inner.store.load_all().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!("❌ No se pudieron cargar las colas guardadas: {}", e);
                return 0;
            }
        };

        let mut restored = 0;
        for snapshot in snapshots {
            if snapshot.guild_id == 0 {
                warn!("⚠️ Snapshot con guild id 0 ignorado");
                continue;
            }
            let guild = GuildId::new(snapshot.guild_id);
            let slot = self.slot(guild);
            let mut state = slot.state.lock();
            state.queue.restore(
                snapshot.queue,
                snapshot.loop_backup,
                snapshot.history,
                snapshot.history_position,
                snapshot.loop_mode,
                snapshot.shuffle,
            );
            state.volume = snapshot.volume.min(100);
            state.text_channel = snapshot.text_channel.filter(|c| *c != 0).map(ChannelId::new);
            info!(
                "📂 Cola restaurada para guild {}: {} canciones",
                guild,
                state.queue.len()
            );
            restored += 1;
        }
        restored
    }

    /// Guarda todos los guilds con contenido (apagado).
    pub async fn flush_snapshots(&self) {
        let guilds: Vec<GuildId> = self
            .inner
            .guilds
            .iter()
            .filter(|e| {
                let state = e.value().state.lock();
                state.has_content() || !state.queue.loop_backup().is_empty()
            })
            .map(|e| *e.key())
            .collect();

        info!("💾 Guardando {} colas antes de apagar", guilds.len());
        for guild in guilds {
            self.persist_now(guild).await;
        }
    }

    /// Olvida el estado en memoria de un guild (el bot ya no pertenece a él).
    pub async fn forget_guild(&self, guild: GuildId) -> bool {
        let Some((_, slot)) = self.inner.guilds.remove(&guild) else {
            return false;
        };
        slot.saver.cancel();
        self.inner.update_locks.remove(&guild);
        self.inner.message_validations.remove(&guild);

        let voice = {
            let mut state = slot.state.lock();
            state.intentional_disconnect = true;
            state.next_token();
            state.voice.take()
        };
        if let Some(voice) = voice {
            voice.disconnect().await;
        }
        info!("🗑️ Estado eliminado para guild {}", guild);
        true
    }

    pub(crate) fn view_of(state: &GuildState) -> Option<NowPlayingView> {
        let song = state.queue.current()?.clone();
        let seeking = state.seek.is_active(std::time::Duration::MAX);
        let voice_paused = state.voice.as_ref().is_some_and(|v| v.is_paused());
        let visible = state.queue.visible_queue();

        Some(NowPlayingView {
            song,
            position: state.clock.position(seeking),
            paused: state.clock.is_paused() || voice_paused,
            volume: state.volume,
            loop_mode: state.queue.loop_mode(),
            shuffle: state.queue.is_shuffle(),
            queue_len: visible.len(),
            next_title: visible.first().map(|s| s.title.clone()),
        })
    }

    /// Publica el mensaje de "now playing" para la canción actual.
    pub(crate) async fn announce_now_playing(&self, guild: GuildId) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };
        let target = {
            let state = slot.state.lock();
            state.text_channel.zip(Self::view_of(&state))
        };
        let Some((channel, view)) = target else {
            return;
        };

        let shown = self.inner.notifier.show_now_playing(guild, channel, view).await;
        self.inner.message_validations.remove(&guild);
        slot.state.lock().now_playing_ready = shown;
    }

    pub(crate) async fn clear_now_playing(&self, guild: GuildId) {
        if let Some(slot) = self.existing_slot(guild) {
            slot.state.lock().now_playing_ready = false;
        }
        self.inner.message_validations.remove(&guild);
        self.inner.notifier.clear_now_playing(guild).await;
    }

    /// Envía un aviso al canal de texto del guild, si hay uno configurado.
    pub(crate) async fn alert(&self, guild: GuildId, alert: Alert) {
        let channel = self
            .existing_slot(guild)
            .and_then(|slot| slot.state.lock().text_channel);
        match channel {
            Some(channel) => {
                warn!("📢 Aviso para guild {}: {}", guild, alert.title());
                self.inner.notifier.alert(guild, channel, alert).await;
            }
            None => debug!("📭 Aviso sin canal de texto en guild {}: {:?}", guild, alert),
        }
    }
}
