use serenity::model::id::{ChannelId, GuildId};
use tracing::info;

use super::engine::MusicEngine;
use super::notify::NowPlayingView;
use super::player::PlaybackOutcome;
use super::queue::{QueuePage, SONGS_PER_PAGE};
use super::song::{LoopMode, Song};
use super::timecode::parse_timestamp;
use crate::error::{PlayerError, PlayerResult};

/// Resultado de encolar una consulta.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub songs: Vec<Song>,
    pub outcome: PlaybackOutcome,
}

impl MusicEngine {
    /// Canal de texto donde se publican avisos y el "now playing".
    pub fn set_text_channel(&self, guild: GuildId, channel: ChannelId) {
        self.slot(guild).state.lock().text_channel = Some(channel);
    }

    /// Resuelve `query` (URL o búsqueda), lo encola y arranca si no había nada sonando.
    pub async fn play(&self, guild: GuildId, query: &str, requested_by: &str) -> PlayerResult<Enqueued> {
        let query = query.trim();
        let resolved = self
            .inner
            .cache
            .get_or_resolve(query, self.inner.extractor.as_ref())
            .await?
            .ok_or_else(|| PlayerError::Extraction(query.to_string()))?;

        let songs: Vec<Song> = resolved
            .into_tracks()
            .into_iter()
            .map(|info| Song::from_track(info, requested_by))
            .collect();
        if songs.is_empty() {
            return Err(PlayerError::Extraction(query.to_string()));
        }

        let slot = self.slot(guild);
        {
            let mut state = slot.state.lock();
            for song in &songs {
                state.queue.enqueue(song.clone());
            }
            state.touch();
        }
        info!("➕ {} canciones añadidas en guild {} por {}", songs.len(), guild, requested_by);
        self.persist(guild);

        let outcome = self.play_next(guild).await;
        Ok(Enqueued { songs, outcome })
    }

    /// Encola una canción ya resuelta sin arrancar la reproducción.
    pub fn enqueue(&self, guild: GuildId, song: Song) {
        let slot = self.slot(guild);
        {
            let mut state = slot.state.lock();
            state.queue.enqueue(song);
            state.touch();
        }
        self.persist(guild);
    }

    /// Salta a una posición (base 0) de la cola visible.
    pub async fn skip_to(&self, guild: GuildId, position: usize, requested_by: &str) -> PlayerResult<Song> {
        let slot = self.slot(guild);
        let _transition = slot.play_lock.lock().await;

        let (voice, target) = {
            let mut state = slot.state.lock();
            let voice = state.live_voice().ok_or(PlayerError::NotConnected)?;
            let target = state.queue.skip_to(position, requested_by)?;
            state.next_token();
            state.clock.reset();
            state.touch();
            (voice, target)
        };
        info!("⏭️ Saltando a la posición {} en guild {}: {}", position, guild, target.title);
        voice.stop();

        self.play_next_locked(guild, &slot).await;
        Ok(target)
    }

    /// Detiene la reproducción y vacía la cola.
    pub async fn stop(&self, guild: GuildId) -> PlayerResult<()> {
        let slot = self.existing_slot(guild).ok_or(PlayerError::NothingPlaying)?;
        let _transition = slot.play_lock.lock().await;

        let voice = {
            let mut state = slot.state.lock();
            state.queue.clear();
            state.clear_playback();
            state.next_token();
            state.touch();
            state.voice.clone()
        };
        if let Some(voice) = voice {
            voice.stop();
        }
        info!("⏹️ Reproducción detenida en guild {}", guild);

        self.clear_now_playing(guild).await;
        self.persist_now(guild).await;
        Ok(())
    }

    pub fn clear_queue(&self, guild: GuildId) -> usize {
        let slot = self.slot(guild);
        let removed = {
            let mut state = slot.state.lock();
            let removed = state.queue.len();
            state.queue.clear();
            removed
        };
        self.persist(guild);
        removed
    }

    pub fn remove(&self, guild: GuildId, position: usize) -> PlayerResult<Song> {
        let slot = self.slot(guild);
        let song = slot.state.lock().queue.remove(position)?;
        self.persist(guild);
        Ok(song)
    }

    pub fn move_song(&self, guild: GuildId, from: usize, to: usize) -> PlayerResult<()> {
        let slot = self.slot(guild);
        slot.state.lock().queue.move_song(from, to)?;
        self.persist(guild);
        Ok(())
    }

    /// Ajusta el volumen (0-100) y lo aplica al track en curso.
    pub fn set_volume(&self, guild: GuildId, volume: u8) -> u8 {
        let slot = self.slot(guild);
        let volume = volume.min(100);
        {
            let mut state = slot.state.lock();
            state.volume = volume;
            if let Some(voice) = state.live_voice() {
                voice.set_volume(f32::from(volume) / 100.0);
            }
        }
        info!("🔊 Volumen en guild {}: {}%", guild, volume);
        self.persist(guild);
        volume
    }

    pub fn set_loop_mode(&self, guild: GuildId, mode: LoopMode) {
        let slot = self.slot(guild);
        slot.state.lock().queue.set_loop_mode(mode);
        self.persist(guild);
    }

    pub fn toggle_shuffle(&self, guild: GuildId) -> bool {
        let slot = self.slot(guild);
        let enabled = slot.state.lock().queue.toggle_shuffle();
        self.persist(guild);
        enabled
    }

    /// Mezcla la cola una vez, sin cambiar el modo aleatorio.
    pub fn shuffle(&self, guild: GuildId) -> PlayerResult<()> {
        let slot = self.slot(guild);
        {
            let mut state = slot.state.lock();
            if state.queue.is_empty() {
                return Err(PlayerError::OutOfRange { position: 0, len: 0 });
            }
            state.queue.shuffle_all();
        }
        self.persist(guild);
        Ok(())
    }

    /// Seek con un texto `SS`, `MM:SS` o `HH:MM:SS`.
    pub async fn seek_to_timestamp(&self, guild: GuildId, timestamp: &str) -> PlayerResult<u64> {
        let target = parse_timestamp(timestamp)?;
        self.seek(guild, i64::try_from(target).unwrap_or(i64::MAX)).await
    }

    pub fn now_playing(&self, guild: GuildId) -> Option<NowPlayingView> {
        let slot = self.existing_slot(guild)?;
        let state = slot.state.lock();
        Self::view_of(&state)
    }

    pub fn current_song(&self, guild: GuildId) -> Option<Song> {
        let slot = self.existing_slot(guild)?;
        let song = slot.state.lock().queue.current().cloned();
        song
    }

    pub fn visible_queue(&self, guild: GuildId) -> Vec<Song> {
        self.existing_slot(guild)
            .map(|slot| slot.state.lock().queue.visible_queue())
            .unwrap_or_default()
    }

    /// Página (base 1) de la cola visible.
    pub fn queue_page(&self, guild: GuildId, page: usize) -> QueuePage {
        self.slot(guild).state.lock().queue.page(page, SONGS_PER_PAGE)
    }

    pub fn history(&self, guild: GuildId) -> Vec<Song> {
        self.existing_slot(guild)
            .map(|slot| slot.state.lock().queue.history().to_vec())
            .unwrap_or_default()
    }

    pub fn volume(&self, guild: GuildId) -> u8 {
        self.existing_slot(guild)
            .map(|slot| slot.state.lock().volume)
            .unwrap_or(self.inner.settings.default_volume)
    }
}
