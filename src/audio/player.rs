use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::engine::MusicEngine;
use super::notify::Alert;
use super::song::{LoopMode, Song};
use super::state::GuildSlot;
use super::timecode::clamp_seek_target;
use super::transport::{CompletionNotifier, SeekMode, SourceSpec, VoiceConnection};
use crate::error::{PlayerError, PlayerResult};
use crate::sources::TrackInfo;

/// Resultado de intentar arrancar la siguiente canción.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Started(Song),
    /// Ya hay algo sonando o en pausa; no se tocó nada.
    AlreadyActive,
    /// No quedaba nada en la cola.
    Idle,
    /// Sin conexión de voz viva.
    NoVoice,
    /// Todos los candidatos fallaron; se avisó al canal.
    Halted,
    /// Hay un seek en curso.
    Busy,
}

impl MusicEngine {
    /// Arranca la siguiente canción si no hay nada sonando.
    pub async fn play_next(&self, guild: GuildId) -> PlaybackOutcome {
        let slot = self.slot(guild);
        let _transition = slot.play_lock.lock().await;
        self.play_next_locked(guild, &slot).await
    }

    /// Cuerpo de `play_next`; el llamador ya tiene `play_lock`.
    pub(crate) async fn play_next_locked(&self, guild: GuildId, slot: &Arc<GuildSlot>) -> PlaybackOutcome {
        let voice = {
            let mut state = slot.state.lock();
            if state.seek.is_active(self.inner.settings.seek_watchdog) {
                debug!("⏳ Seek en curso en guild {}, play_next ignorado", guild);
                return PlaybackOutcome::Busy;
            }

            let voice = state.live_voice();
            if let Some(voice) = &voice {
                if state.queue.current().is_some() && (voice.is_playing() || voice.is_paused()) {
                    return PlaybackOutcome::AlreadyActive;
                }
            }

            match voice {
                Some(voice) => voice,
                None => {
                    debug!("🔇 Sin conexión de voz en guild {}", guild);
                    state.clear_playback();
                    return PlaybackOutcome::NoVoice;
                }
            }
        };

        for attempt in 1..=self.inner.settings.max_skip_attempts {
            let candidate = slot.state.lock().queue.dequeue_next();
            let Some(mut song) = candidate else {
                self.handle_empty_queue(guild, slot).await;
                return PlaybackOutcome::Idle;
            };

            debug!(
                "🎵 Candidato {}/{} en guild {}: {}",
                attempt, self.inner.settings.max_skip_attempts, guild, song.title
            );

            match self.start_song(guild, slot, &voice, &mut song).await {
                Ok(()) => {
                    info!("▶️ Reproduciendo en guild {}: {}", guild, song.title);
                    {
                        let mut state = slot.state.lock();
                        state.queue.set_current(Some(song.clone()));
                        state.clock.start(0);
                        state.touch();
                        state.queue.reset_history_cursor();
                    }
                    self.persist(guild);
                    self.announce_now_playing(guild).await;
                    return PlaybackOutcome::Started(song);
                }
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir {} en guild {}: {}", song.title, guild, e);
                    self.handle_song_skip(guild, slot, song).await;
                }
            }
        }

        error!(
            "❌ {} fallos seguidos en guild {}, reproducción detenida",
            self.inner.settings.max_skip_attempts, guild
        );
        slot.state.lock().clear_playback();
        self.persist(guild);
        self.clear_now_playing(guild).await;
        self.alert(guild, Alert::PlaybackHalted).await;
        PlaybackOutcome::Halted
    }

    /// Resuelve, valida y entrega la canción al transporte.
    async fn start_song(
        &self,
        guild: GuildId,
        slot: &Arc<GuildSlot>,
        voice: &Arc<dyn VoiceConnection>,
        song: &mut Song,
    ) -> PlayerResult<()> {
        let info = self.resolve_stream(song).await?;
        song.refresh_from(&info);

        if !self.inner.validator.validate(&song.url).await {
            warn!("⚠️ Stream no verificado, se intenta igual: {}", song.title);
        }

        let (token, volume) = {
            let mut state = slot.state.lock();
            (state.next_token(), state.volume)
        };
        let notifier = CompletionNotifier::new(self.inner.events.clone(), guild, token);
        voice.play(SourceSpec::new(song.url.clone(), volume), notifier).await?;
        Ok(())
    }

    /// Obtiene un stream reproducible fresco, con reintentos y backoff exponencial.
    ///
    /// Streams are always re-extracted because direct URLs expire.
    pub(crate) async fn resolve_stream(&self, song: &Song) -> PlayerResult<TrackInfo> {
        let target = if song.webpage_url.is_empty() { &song.url } else { &song.webpage_url };
        let attempts = self.inner.settings.resolve_attempts.max(1);
        let mut backoff = self.inner.settings.resolve_backoff;

        for attempt in 1..=attempts {
            match self.inner.extractor.resolve(target).await {
                Ok(Some(resolved)) => match resolved.first() {
                    Some(info) if info.is_playable() => return Ok(info.clone()),
                    _ => debug!("🔍 Intento {}: sin stream reproducible para {}", attempt, song.title),
                },
                Ok(None) => debug!("🔍 Intento {}: sin resultados para {}", attempt, song.title),
                Err(e) => debug!("🔍 Intento {} falló para {}: {}", attempt, song.title, e),
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(PlayerError::Extraction(song.title.clone()))
    }

    async fn handle_song_skip(&self, guild: GuildId, slot: &Arc<GuildSlot>, song: Song) {
        {
            let mut state = slot.state.lock();
            if state.queue.demote_song_loop() {
                info!("🔂 Repetición de canción desactivada en guild {} por fallo del stream", guild);
                state.queue.set_current(None);
            }
            state.queue.add_to_history(song.clone());
        }
        self.alert(guild, Alert::SongSkipped { title: song.title }).await;
    }

    async fn handle_empty_queue(&self, guild: GuildId, slot: &Arc<GuildSlot>) {
        info!("📭 Cola terminada en guild {}", guild);
        {
            let mut state = slot.state.lock();
            state.clear_playback();
            state.touch();
        }
        self.clear_now_playing(guild).await;
        self.persist(guild);
    }

    /// Fin de track notificado por el transporte.
    pub(crate) async fn on_track_finished(&self, guild: GuildId, token: u64, error: Option<String>) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };
        let _transition = slot.play_lock.lock().await;

        {
            let mut state = slot.state.lock();
            if state.track_token != token {
                debug!("🕰️ Fin de track obsoleto en guild {} (token {})", guild, token);
                return;
            }
            if state.live_voice().is_none() {
                debug!("🔌 Fin de track sin voz en guild {}, lo gestiona el supervisor", guild);
                return;
            }

            match &error {
                Some(e) => error!("❌ Error de reproducción en guild {}: {}", guild, e),
                None => debug!("⏹️ Track terminado en guild {}", guild),
            }

            if state.seek.is_active(self.inner.settings.seek_watchdog) {
                return;
            }
            if error.is_none() {
                if let Some(current) = state.queue.current().cloned() {
                    state.queue.add_to_history(current);
                }
            }
            // Libera la canción salvo en loop de canción, donde se repite.
            if state.queue.loop_mode() != LoopMode::Song {
                state.queue.set_current(None);
            }
            state.clock.reset();
        }

        self.play_next_locked(guild, &slot).await;
    }

    /// Salta la canción actual.
    pub async fn skip(&self, guild: GuildId) -> PlayerResult<PlaybackOutcome> {
        let slot = self.slot(guild);
        let _transition = slot.play_lock.lock().await;

        let voice = {
            let mut state = slot.state.lock();
            let voice = state.live_voice().ok_or(PlayerError::NotConnected)?;
            let current = state.queue.take_current().ok_or(PlayerError::NothingPlaying)?;
            info!("⏭️ Saltando en guild {}: {}", guild, current.title);
            state.queue.add_to_history(current);
            state.next_token();
            state.clock.reset();
            state.touch();
            voice
        };
        voice.stop();

        Ok(self.play_next_locked(guild, &slot).await)
    }

    pub async fn pause(&self, guild: GuildId) -> PlayerResult<()> {
        let slot = self.slot(guild);
        let _transition = slot.play_lock.lock().await;
        let mut state = slot.state.lock();
        let voice = state.live_voice().ok_or(PlayerError::NotConnected)?;
        if state.queue.current().is_none() || !voice.is_playing() {
            return Err(PlayerError::NothingPlaying);
        }
        voice.pause();
        state.clock.pause();
        state.touch();
        info!("⏸️ Pausado en guild {}", guild);
        Ok(())
    }

    pub async fn resume(&self, guild: GuildId) -> PlayerResult<()> {
        let slot = self.slot(guild);
        let _transition = slot.play_lock.lock().await;
        let mut state = slot.state.lock();
        let voice = state.live_voice().ok_or(PlayerError::NotConnected)?;
        if state.queue.current().is_none() || !voice.is_paused() {
            return Err(PlayerError::NothingPlaying);
        }
        voice.resume();
        state.clock.resume();
        state.touch();
        info!("▶️ Reanudado en guild {}", guild);
        Ok(())
    }

    /// Salta a una posición de la canción actual. Devuelve el objetivo ajustado.
    pub async fn seek(&self, guild: GuildId, target: i64) -> PlayerResult<u64> {
        let slot = self.slot(guild);
        if slot.state.lock().seek.is_active(self.inner.settings.seek_watchdog) {
            return Err(PlayerError::SeekInProgress);
        }
        let _transition = slot.play_lock.lock().await;

        let (voice, song, target, was_paused) = {
            let mut state = slot.state.lock();
            if state.seek.is_active(self.inner.settings.seek_watchdog) {
                return Err(PlayerError::SeekInProgress);
            }
            let song = state.queue.current().cloned().ok_or(PlayerError::NothingPlaying)?;
            let voice = state.live_voice().ok_or(PlayerError::NotConnected)?;
            let target = clamp_seek_target(target, song.duration);
            let was_paused = voice.is_paused() || state.clock.is_paused();

            state.seek.begin();
            state.clock.set_seek_offset(target);
            state.next_token();
            state.touch();
            (voice, song, target, was_paused)
        };

        info!("⏩ Seek en guild {} a {}s: {}", guild, target, song.title);
        voice.stop();

        let started = match self.resolve_stream(&song).await {
            Ok(info) => self.play_with_fallback(guild, &slot, &voice, &info, target).await,
            Err(e) => {
                warn!("⚠️ Seek sin stream en guild {}: {}", guild, e);
                None
            }
        };

        match started {
            Some(mode) => {
                {
                    let mut state = slot.state.lock();
                    state.clock.start(mode.offset());
                    if was_paused {
                        voice.pause();
                        state.clock.pause_at(mode.offset());
                    }
                    state.seek.end();
                    state.now_playing_ready = true;
                }
                self.inner.message_validations.remove(&guild);
                Ok(mode.offset())
            }
            None => {
                {
                    let mut state = slot.state.lock();
                    state.seek.end();
                    if let Some(current) = state.queue.take_current() {
                        state.queue.enqueue_front(current);
                    }
                    state.clock.reset();
                }
                let restarted = matches!(
                    self.play_next_locked(guild, &slot).await,
                    PlaybackOutcome::Started(_)
                );
                self.alert(guild, Alert::SeekFailed { restarted }).await;
                Err(PlayerError::Extraction(song.title))
            }
        }
    }

    /// Prueba las estrategias de seek en orden y devuelve la que funcionó.
    async fn play_with_fallback(
        &self,
        guild: GuildId,
        slot: &Arc<GuildSlot>,
        voice: &Arc<dyn VoiceConnection>,
        info: &TrackInfo,
        target: u64,
    ) -> Option<SeekMode> {
        let url = info.url.clone()?;
        for mode in SeekMode::strategies(target) {
            let (token, volume) = {
                let mut state = slot.state.lock();
                (state.next_token(), state.volume)
            };
            let notifier = CompletionNotifier::new(self.inner.events.clone(), guild, token);
            let source = SourceSpec::new(url.clone(), volume).with_seek(mode);

            match voice.play(source, notifier).await {
                Ok(()) => {
                    debug!("✅ Seek aplicado con {:?}", mode);
                    return Some(mode);
                }
                Err(e) => debug!("⚠️ Estrategia {:?} falló: {}", mode, e),
            }
        }
        None
    }

    /// Vuelve a la canción anterior del historial.
    pub async fn play_previous(&self, guild: GuildId) -> PlayerResult<Song> {
        let slot = self.slot(guild);
        let _transition = slot.play_lock.lock().await;

        let (voice, previous) = {
            let mut state = slot.state.lock();
            let voice = state.live_voice().ok_or(PlayerError::NotConnected)?;
            let previous = state.queue.step_back()?;
            state.next_token();
            state.clock.reset();
            state.touch();
            (voice, previous)
        };
        info!("⏮️ Volviendo a la canción anterior en guild {}: {}", guild, previous.title);
        voice.stop();

        let info = match self.resolve_previous(&previous).await {
            Some(info) => info,
            None => {
                warn!("⚠️ No se pudo obtener la canción anterior: {}", previous.title);
                slot.state.lock().queue.set_current(None);
                self.play_next_locked(guild, &slot).await;
                return Err(PlayerError::Extraction(previous.title));
            }
        };

        let mut song = previous;
        song.refresh_from(&info);

        let (token, volume) = {
            let mut state = slot.state.lock();
            state.queue.set_current(Some(song.clone()));
            (state.next_token(), state.volume)
        };
        let notifier = CompletionNotifier::new(self.inner.events.clone(), guild, token);
        if let Err(e) = voice.play(SourceSpec::new(song.url.clone(), volume), notifier).await {
            error!("❌ Error reproduciendo la canción anterior en guild {}: {}", guild, e);
            slot.state.lock().clear_playback();
            self.persist(guild);
            return Err(e.into());
        }

        slot.state.lock().clock.start(0);
        self.persist(guild);
        self.announce_now_playing(guild).await;
        Ok(song)
    }

    async fn resolve_previous(&self, song: &Song) -> Option<TrackInfo> {
        let attempts = self.inner.settings.previous_attempts.max(1);
        for attempt in 1..=attempts {
            match self
                .inner
                .cache
                .get_or_resolve(&song.webpage_url, self.inner.extractor.as_ref())
                .await
            {
                Ok(Some(resolved)) => {
                    if let Some(info) = resolved.first().filter(|i| i.is_playable()) {
                        return Some(info.clone());
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("🔍 Intento {} de canción anterior falló: {}", attempt, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.inner.settings.previous_retry_delay).await;
            }
        }
        None
    }
}
