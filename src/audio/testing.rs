//! Dobles de prueba para los colaboradores del motor.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::engine::{EngineDeps, MusicEngine};
use super::notify::{Alert, NotificationSink, NowPlayingView};
use super::song::Song;
use super::transport::{
    CompletionNotifier, EngineEvents, SeekMode, SourceSpec, VoiceConnection, VoiceTransport,
};
use crate::config::EngineSettings;
use crate::error::{PlayerError, PlayerResult, VoiceError};
use crate::sources::{Extractor, Resolved, StreamValidator, TrackInfo};
use crate::storage::{QueueSnapshot, SnapshotStore};

pub fn guild() -> GuildId {
    GuildId::new(1)
}

pub fn voice_channel() -> ChannelId {
    ChannelId::new(10)
}

pub fn text_channel() -> ChannelId {
    ChannelId::new(20)
}

pub fn webpage(id: &str) -> String {
    format!("https://youtube.test/watch?v={id}")
}

/// Extractor guionizado: cada id registrado resuelve a un stream nuevo.
#[derive(Default)]
pub struct FakeExtractor {
    tracks: Mutex<HashMap<String, TrackInfo>>,
    broken: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    streams: AtomicUsize,
}

impl FakeExtractor {
    pub fn track(&self, id: &str, duration: u64) -> Song {
        let info = TrackInfo {
            url: None,
            webpage_url: webpage(id),
            title: id.to_uppercase(),
            duration: Some(duration as f64),
            thumbnail: None,
            uploader: Some("tester".into()),
        };
        self.tracks.lock().insert(webpage(id), info.clone());
        Song::from_track(info, "alice")
    }

    pub fn break_track(&self, id: &str) -> Song {
        let song = self.track(id, 120);
        self.broken.lock().insert(webpage(id));
        song
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn resolve(&self, query: &str) -> PlayerResult<Option<Resolved>> {
        self.calls.lock().push(query.to_string());
        if self.broken.lock().contains(query) {
            return Err(PlayerError::Extraction(query.to_string()));
        }
        let Some(mut info) = self.tracks.lock().get(query).cloned() else {
            return Ok(None);
        };
        let n = self.streams.fetch_add(1, Ordering::SeqCst);
        info.url = Some(format!("https://cdn.test/{}?n={}", info.title.to_lowercase(), n));
        Ok(Some(Resolved::Track(info)))
    }
}

pub struct AlwaysReachable;

#[async_trait]
impl StreamValidator for AlwaysReachable {
    async fn validate(&self, _url: &str) -> bool {
        true
    }
}

#[derive(Default)]
struct ConnState {
    playing: bool,
    paused: bool,
    volume: f32,
    plays: Vec<SourceSpec>,
    active: Option<CompletionNotifier>,
}

/// Conexión simulada: registra cada fuente y deja terminar tracks a mano.
pub struct FakeConnection {
    channel: ChannelId,
    connected: AtomicBool,
    reject_input_seek: AtomicBool,
    state: Mutex<ConnState>,
}

impl FakeConnection {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            connected: AtomicBool::new(true),
            reject_input_seek: AtomicBool::new(false),
            state: Mutex::new(ConnState {
                volume: 1.0,
                ..ConnState::default()
            }),
        }
    }

    /// El track en curso termina con normalidad.
    pub fn finish(&self) {
        let active = {
            let mut state = self.state.lock();
            state.playing = false;
            state.paused = false;
            state.active.take()
        };
        if let Some(notifier) = active {
            notifier.notify(None);
        }
    }

    /// El track deja de sonar sin avisar a nadie.
    pub fn stall(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.paused = false;
    }

    /// Se corta el enlace de voz.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.stall();
    }

    pub fn reject_input_seek(&self) {
        self.reject_input_seek.store(true, Ordering::SeqCst);
    }

    pub fn plays(&self) -> Vec<SourceSpec> {
        self.state.lock().plays.clone()
    }

    pub fn last_play(&self) -> Option<SourceSpec> {
        self.state.lock().plays.last().cloned()
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&self, source: SourceSpec, on_complete: CompletionNotifier) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::Transport("not connected".into()));
        }
        if matches!(source.seek, SeekMode::Input(_)) && self.reject_input_seek.load(Ordering::SeqCst) {
            return Err(VoiceError::Source("input seek rejected".into()));
        }

        let replaced = {
            let mut state = self.state.lock();
            state.plays.push(source.clone());
            state.volume = source.volume;
            state.playing = true;
            state.paused = false;
            state.active.replace(on_complete)
        };
        if let Some(previous) = replaced {
            previous.notify(None);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.playing && !state.paused
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if state.playing {
            state.paused = true;
        }
    }

    fn resume(&self) {
        self.state.lock().paused = false;
    }

    fn stop(&self) {
        let active = {
            let mut state = self.state.lock();
            state.playing = false;
            state.paused = false;
            state.active.take()
        };
        if let Some(notifier) = active {
            notifier.notify(None);
        }
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume;
    }

    async fn disconnect(&self) {
        self.drop_link();
    }

    fn channel(&self) -> Option<ChannelId> {
        Some(self.channel)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    existing: Mutex<Option<Arc<FakeConnection>>>,
    fail_connect: AtomicBool,
    hang_connect: AtomicBool,
}

impl FakeTransport {
    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// `connect` no responde nunca.
    pub fn hang_connect(&self) {
        self.hang_connect.store(true, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Última conexión creada.
    pub fn last(&self) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no connection was created")
    }

    /// Simula una reconexión hecha por la plataforma.
    pub fn heal(&self, channel: ChannelId) -> Arc<FakeConnection> {
        let connection = Arc::new(FakeConnection::new(channel));
        self.connections.lock().push(connection.clone());
        *self.existing.lock() = Some(connection.clone());
        connection
    }

    /// La plataforma expone la llamada en curso como un handle nuevo, sin
    /// estado de reproducción.
    pub fn expose_fresh_handle(&self, channel: ChannelId) -> Arc<FakeConnection> {
        let connection = Arc::new(FakeConnection::new(channel));
        *self.existing.lock() = Some(connection.clone());
        connection
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        _guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(VoiceError::Transport("gateway unavailable".into()));
        }
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let connection = Arc::new(FakeConnection::new(channel));
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    async fn existing(&self, _guild: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        self.existing
            .lock()
            .clone()
            .map(|c| c as Arc<dyn VoiceConnection>)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
    pub shown: AtomicUsize,
    pub refreshed: AtomicUsize,
    pub cleared: AtomicUsize,
    message_gone: AtomicBool,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn count(&self, wanted: &Alert) -> usize {
        self.alerts.lock().iter().filter(|a| *a == wanted).count()
    }

    pub fn delete_message(&self) {
        self.message_gone.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn show_now_playing(&self, _guild: GuildId, _channel: ChannelId, _view: NowPlayingView) -> bool {
        self.shown.fetch_add(1, Ordering::SeqCst);
        self.message_gone.store(false, Ordering::SeqCst);
        true
    }

    async fn refresh_now_playing(&self, _guild: GuildId, _view: NowPlayingView) {
        self.refreshed.fetch_add(1, Ordering::SeqCst);
    }

    async fn now_playing_exists(&self, _guild: GuildId) -> Option<bool> {
        Some(!self.message_gone.load(Ordering::SeqCst))
    }

    async fn clear_now_playing(&self, _guild: GuildId) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    async fn alert(&self, _guild: GuildId, _channel: ChannelId, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<u64, QueueSnapshot>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn seed(&self, snapshot: QueueSnapshot) {
        self.snapshots.lock().insert(snapshot.guild_id, snapshot);
    }

    pub fn saved(&self, guild: GuildId) -> Option<QueueSnapshot> {
        self.snapshots.lock().get(&guild.get()).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save_snapshot(&self, snapshot: &QueueSnapshot) -> PlayerResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.snapshots.lock().insert(snapshot.guild_id, snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, guild_id: u64) -> PlayerResult<Option<QueueSnapshot>> {
        Ok(self.snapshots.lock().get(&guild_id).cloned())
    }

    async fn load_all(&self) -> PlayerResult<Vec<QueueSnapshot>> {
        Ok(self.snapshots.lock().values().cloned().collect())
    }
}

/// Motor con todos sus colaboradores simulados.
pub struct Harness {
    pub engine: MusicEngine,
    pub events: EngineEvents,
    pub extractor: Arc<FakeExtractor>,
    pub transport: Arc<FakeTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let extractor = Arc::new(FakeExtractor::default());
        let transport = Arc::new(FakeTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());

        let (engine, events) = MusicEngine::new(
            settings,
            EngineDeps {
                extractor: extractor.clone(),
                validator: Arc::new(AlwaysReachable),
                transport: transport.clone(),
                store: store.clone(),
                notifier: notifier.clone(),
            },
        );

        Self {
            engine,
            events,
            extractor,
            transport,
            notifier,
            store,
        }
    }

    /// Motor ya unido al canal de voz y con canal de texto.
    pub async fn connected() -> Self {
        let harness = Self::new();
        harness
            .engine
            .join(guild(), voice_channel())
            .await
            .expect("join failed");
        harness.engine.set_text_channel(guild(), text_channel());
        harness
    }

    pub fn conn(&self) -> Arc<FakeConnection> {
        self.transport.last()
    }

    /// Entrega todos los eventos pendientes, incluidos los que generen.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.engine.handle_event(event).await;
        }
    }

    /// Termina el track en curso y procesa la transición.
    pub async fn finish_current(&mut self) {
        self.conn().finish();
        self.pump().await;
    }

    pub async fn play(&self, id: &str) {
        self.engine
            .play(guild(), &webpage(id), "alice")
            .await
            .expect("play failed");
    }

    pub fn current_title(&self) -> Option<String> {
        self.engine.current_song(guild()).map(|s| s.title)
    }

    pub fn queue_titles(&self) -> Vec<String> {
        self.engine
            .visible_queue(guild())
            .into_iter()
            .map(|s| s.title)
            .collect()
    }
}
