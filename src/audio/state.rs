use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::debounce::Debouncer;
use super::queue::MusicQueue;
use super::transport::VoiceConnection;

/// Reloj de reproducción: posición derivada de `start_time`, `seek_offset`
/// y `pause_position`.
///
/// Exactly one regime applies at a time: frozen at `seek_offset` while
/// seeking, frozen at `pause_position` while paused, or running.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    start_time: Option<Instant>,
    seek_offset: u64,
    pause_position: Option<u64>,
}

impl PlaybackClock {
    /// Arranca el reloj en `offset` segundos.
    pub fn start(&mut self, offset: u64) {
        self.start_time = Some(Instant::now());
        self.seek_offset = offset;
        self.pause_position = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn pause(&mut self) {
        let position = self.position(false);
        self.pause_position = Some(position);
    }

    /// Congela el reloj en una posición conocida (re-pausa tras un seek).
    pub fn pause_at(&mut self, position: u64) {
        self.pause_position = Some(position);
    }

    pub fn resume(&mut self) {
        if let Some(position) = self.pause_position.take() {
            self.seek_offset = position;
            self.start_time = Some(Instant::now());
        }
    }

    pub fn position(&self, seeking: bool) -> u64 {
        if seeking {
            return self.seek_offset;
        }
        if let Some(paused) = self.pause_position {
            return paused;
        }
        match self.start_time {
            Some(start) => self.seek_offset + start.elapsed().as_secs(),
            None => self.seek_offset,
        }
    }

    pub fn is_started(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_position.is_some()
    }

    pub fn seek_offset(&self) -> u64 {
        self.seek_offset
    }

    pub fn set_seek_offset(&mut self, offset: u64) {
        self.seek_offset = offset;
    }
}

/// Bandera de seek con watchdog: se considera libre pasado `timeout`.
#[derive(Debug, Clone, Default)]
pub struct SeekGuard {
    started_at: Option<Instant>,
}

impl SeekGuard {
    pub fn begin(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn end(&mut self) {
        self.started_at = None;
    }

    pub fn is_active(&self, timeout: Duration) -> bool {
        self.started_at.is_some_and(|t| t.elapsed() < timeout)
    }

    /// Limpia la bandera si el watchdog venció. Devuelve `true` si la limpió.
    pub fn clear_if_expired(&mut self, timeout: Duration) -> bool {
        if self.started_at.is_some_and(|t| t.elapsed() >= timeout) {
            self.started_at = None;
            return true;
        }
        false
    }
}

/// Estado en memoria de un guild.
pub struct GuildState {
    pub guild_id: GuildId,
    pub queue: MusicQueue,
    pub volume: u8,
    pub voice: Option<Arc<dyn VoiceConnection>>,
    pub voice_channel: Option<ChannelId>,
    pub text_channel: Option<ChannelId>,
    pub clock: PlaybackClock,
    pub seek: SeekGuard,
    pub intentional_disconnect: bool,
    pub last_activity: Instant,
    /// Generación del track en curso; completions con otro valor se ignoran.
    pub track_token: u64,
    pub now_playing_ready: bool,
}

impl GuildState {
    pub fn new(guild_id: GuildId, max_history: usize, volume: u8) -> Self {
        Self {
            guild_id,
            queue: MusicQueue::new(max_history),
            volume: volume.min(100),
            voice: None,
            voice_channel: None,
            text_channel: None,
            clock: PlaybackClock::default(),
            seek: SeekGuard::default(),
            intentional_disconnect: false,
            last_activity: Instant::now(),
            track_token: 0,
            now_playing_ready: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Invalida cualquier completion pendiente del track anterior.
    pub fn next_token(&mut self) -> u64 {
        self.track_token = self.track_token.wrapping_add(1);
        self.track_token
    }

    pub fn has_content(&self) -> bool {
        self.queue.current().is_some() || !self.queue.is_empty()
    }

    /// Conexión viva, si la hay.
    pub fn live_voice(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.voice.clone().filter(|v| v.is_connected())
    }

    /// Limpia el track actual y el reloj (la cola queda intacta).
    pub fn clear_playback(&mut self) {
        self.queue.set_current(None);
        self.clock.reset();
        self.now_playing_ready = false;
    }
}

/// Slot de un guild dentro del motor.
///
/// `state` is a short-lived sync lock and is never held across an await.
/// `play_lock` serializes playback transitions for this guild only.
pub struct GuildSlot {
    pub state: Mutex<GuildState>,
    pub play_lock: tokio::sync::Mutex<()>,
    pub saver: Debouncer,
}

impl GuildSlot {
    pub fn new(state: GuildState, save_delay: Duration) -> Self {
        Self {
            state: Mutex::new(state),
            play_lock: tokio::sync::Mutex::new(()),
            saver: Debouncer::new(save_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_running_clock_advances_from_offset() {
        let mut clock = PlaybackClock::default();
        assert_eq!(clock.position(false), 0);

        clock.start(30);
        tokio::time::advance(Duration::from_secs(12)).await;
        assert_eq!(clock.position(false), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_and_resume_continues() {
        let mut clock = PlaybackClock::default();
        clock.start(0);
        tokio::time::advance(Duration::from_secs(10)).await;
        clock.pause();

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(clock.position(false), 10);
        assert!(clock.is_paused());

        clock.resume();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.position(false), 15);
        assert!(!clock.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeking_reports_the_offset() {
        let mut clock = PlaybackClock::default();
        clock.start(0);
        tokio::time::advance(Duration::from_secs(50)).await;
        clock.set_seek_offset(120);
        assert_eq!(clock.position(true), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_watchdog_expires() {
        let timeout = Duration::from_secs(15);
        let mut guard = SeekGuard::default();
        guard.begin();
        assert!(guard.is_active(timeout));
        assert!(!guard.clear_if_expired(timeout));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(!guard.is_active(timeout));
        assert!(guard.clear_if_expired(timeout));
        assert!(!guard.clear_if_expired(timeout));
    }
}
