use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::engine::MusicEngine;
use super::notify::Alert;
use super::player::PlaybackOutcome;
use super::state::GuildSlot;
use super::transport::VoiceConnection;
use crate::error::{PlayerError, PlayerResult, VoiceError};

impl MusicEngine {
    /// Conecta el bot al canal de voz indicado.
    pub async fn join(&self, guild: GuildId, channel: ChannelId) -> PlayerResult<()> {
        let slot = self.slot(guild);

        if let Some(voice) = slot.state.lock().live_voice() {
            if voice.channel() == Some(channel) {
                debug!("🔊 Ya conectado al canal {} en guild {}", channel, guild);
                return Ok(());
            }
        }

        let voice = self.connect_with_timeout(guild, channel).await?;
        {
            let mut state = slot.state.lock();
            state.voice = Some(voice);
            state.voice_channel = Some(channel);
            state.intentional_disconnect = false;
            state.touch();
        }
        info!("🔊 Conectado al canal {} en guild {}", channel, guild);
        Ok(())
    }

    /// Desconexión pedida por el usuario: no se intenta reconectar.
    pub async fn leave(&self, guild: GuildId) -> PlayerResult<()> {
        let slot = self.existing_slot(guild).ok_or(PlayerError::NotConnected)?;
        let voice = {
            let mut state = slot.state.lock();
            let voice = state.voice.take().ok_or(PlayerError::NotConnected)?;
            state.intentional_disconnect = true;
            state.next_token();
            voice
        };

        voice.stop();
        voice.disconnect().await;
        info!("👋 Desconectado de voz en guild {}", guild);

        let channel = slot.state.lock().voice_channel;
        self.on_voice_disconnected(guild, channel).await;
        Ok(())
    }

    async fn connect_with_timeout(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError> {
        match tokio::time::timeout(
            self.inner.settings.reconnect_timeout,
            self.inner.transport.connect(guild, channel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VoiceError::Timeout),
        }
    }

    /// El bot salió del canal de voz (por orden propia o por la red).
    pub(crate) async fn on_voice_disconnected(&self, guild: GuildId, channel: Option<ChannelId>) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };

        let (intentional, has_content, channel) = {
            let mut state = slot.state.lock();
            state.next_token();
            if let Some(voice) = state.voice.take() {
                voice.stop();
            }
            let intentional = std::mem::take(&mut state.intentional_disconnect);
            (
                intentional,
                state.has_content(),
                channel.or(state.voice_channel),
            )
        };

        if intentional {
            info!("👋 Desconexión intencional en guild {}, limpiando estado", guild);
            {
                let mut state = slot.state.lock();
                state.queue.clear();
                state.clear_playback();
                state.queue.reset_history_cursor();
                state.voice_channel = None;
            }
            self.clear_now_playing(guild).await;
            self.persist(guild);
            return;
        }

        if has_content {
            warn!("🔌 Conexión de voz perdida en guild {}, reintentando", guild);
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.attempt_reconnect(guild, channel).await {
                    debug!("🔌 Reconexión abandonada: {}", e);
                }
            });
        } else {
            debug!("🔌 Desconectado sin contenido en guild {}", guild);
            {
                let mut state = slot.state.lock();
                state.queue.clear();
                state.clear_playback();
                state.queue.reset_history_cursor();
            }
            self.persist(guild);
        }
    }

    /// Reintento único de reconexión tras una caída.
    pub(crate) async fn attempt_reconnect(
        &self,
        guild: GuildId,
        channel: Option<ChannelId>,
    ) -> PlayerResult<()> {
        tokio::time::sleep(self.inner.settings.reconnect_delay).await;
        let Some(slot) = self.existing_slot(guild) else {
            return Ok(());
        };

        // Una conexión ya adoptada (evento de conexión) no se reemplaza.
        if slot.state.lock().live_voice().is_some() {
            self.resume_after_reconnect(guild).await;
            return Ok(());
        }
        if let Some(existing) = self.inner.transport.existing(guild).await {
            if existing.is_connected() {
                info!("🔄 Conexión restablecida por la plataforma en guild {}", guild);
                self.adopt_voice(&slot, existing);
                self.resume_after_reconnect(guild).await;
                return Ok(());
            }
        }

        let Some(channel) = channel else {
            return Err(self.reconnect_failed(guild, &slot, "sin canal conocido").await);
        };

        match self.connect_with_timeout(guild, channel).await {
            Ok(voice) => {
                info!("✅ Reconectado al canal {} en guild {}", channel, guild);
                self.adopt_voice(&slot, voice);
                self.resume_after_reconnect(guild).await;
                Ok(())
            }
            Err(e) => Err(self.reconnect_failed(guild, &slot, &e.to_string()).await),
        }
    }

    fn adopt_voice(&self, slot: &Arc<GuildSlot>, voice: Arc<dyn VoiceConnection>) {
        let mut state = slot.state.lock();
        state.voice_channel = voice.channel().or(state.voice_channel);
        state.voice = Some(voice);
        state.touch();
    }

    async fn reconnect_failed(&self, guild: GuildId, slot: &Arc<GuildSlot>, reason: &str) -> PlayerError {
        error!("❌ No se pudo reconectar en guild {}: {}", guild, reason);
        {
            let mut state = slot.state.lock();
            state.clear_playback();
            state.voice = None;
        }
        self.clear_now_playing(guild).await;
        self.persist(guild);
        self.alert(guild, Alert::ConnectionLost).await;
        PlayerError::ConnectionLost(guild)
    }

    /// Retoma la reproducción tras reconectar: la canción interrumpida
    /// vuelve a empezar desde el principio.
    pub(crate) async fn resume_after_reconnect(&self, guild: GuildId) -> PlaybackOutcome {
        let Some(slot) = self.existing_slot(guild) else {
            return PlaybackOutcome::Idle;
        };
        let _transition = slot.play_lock.lock().await;

        {
            let mut state = slot.state.lock();
            let Some(voice) = state.live_voice() else {
                return PlaybackOutcome::NoVoice;
            };
            if voice.is_playing() || voice.is_paused() {
                return PlaybackOutcome::AlreadyActive;
            }
            if let Some(current) = state.queue.take_current() {
                info!("🔁 Reanudando {} desde el inicio en guild {}", current.title, guild);
                state.queue.enqueue_front(current);
            }
            state.clock.reset();
        }

        self.play_next_locked(guild, &slot).await
    }

    /// El bot entró en un canal de voz (join propio o auto-reconexión).
    pub(crate) async fn on_voice_connected(&self, guild: GuildId, channel: ChannelId) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };

        let needs_adopt = slot.state.lock().live_voice().is_none();
        if needs_adopt {
            match self.inner.transport.existing(guild).await {
                Some(voice) => self.adopt_voice(&slot, voice),
                None => {
                    debug!("🔊 Evento de conexión sin transporte en guild {}", guild);
                    return;
                }
            }
        }
        slot.state.lock().voice_channel = Some(channel);

        tokio::time::sleep(self.inner.settings.resume_delay).await;

        let should_resume = {
            let state = slot.state.lock();
            !state.intentional_disconnect && state.has_content()
        };
        if should_resume {
            self.resume_after_reconnect(guild).await;
        }
    }
}
