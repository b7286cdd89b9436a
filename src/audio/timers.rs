//! Tareas periódicas de mantenimiento del motor.
//!
//! Every loop runs until the shared [`CancellationToken`] fires. Each tick
//! walks a snapshot of the guild ids, so guilds added or removed mid-sweep are
//! simply picked up on the next tick.

use serenity::model::id::GuildId;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::MusicEngine;
use crate::config::TimerSettings;

/// Guilds a los que el bot pertenece actualmente.
pub trait GuildMembership: Send + Sync {
    /// `None` mientras la plataforma aún no conoce la lista.
    fn active_guilds(&self) -> Option<HashSet<GuildId>>;
}

pub struct BackgroundTimers {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTimers {
    pub fn spawn(
        engine: MusicEngine,
        membership: Arc<dyn GuildMembership>,
        settings: TimerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::new();

        handles.push(every(settings.idle_sweep, cancel.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.idle_sweep().await; }
            }
        }));

        handles.push(every(settings.cache_sweep, cancel.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move {
                    let removed = engine.cache().cleanup_expired();
                    let metrics = engine.cache().metrics();
                    debug!(
                        "💾 Cache: {} entradas, {} expiradas, hit rate {:.1}%",
                        metrics.entries,
                        removed,
                        metrics.hit_rate() * 100.0
                    );
                }
            }
        }));

        handles.push(every(settings.guild_purge, cancel.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                let membership = membership.clone();
                async move {
                    if let Some(active) = membership.active_guilds() {
                        engine.purge_departed_guilds(&active).await;
                    }
                }
            }
        }));

        handles.push(every(settings.now_playing, cancel.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.refresh_now_playing_all().await }
            }
        }));

        handles.push(every(settings.validation_sweep, cancel.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.sweep_validation_cache(); }
            }
        }));

        handles.push(every(settings.voice_health, cancel, {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.check_voice_health().await }
            }
        }));

        info!("⏱️ {} tareas de mantenimiento iniciadas", handles.len());
        Self { handles }
    }

    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn every<F, Fut>(period: Duration, cancel: CancellationToken, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => tick().await,
            }
        }
    })
}

impl MusicEngine {
    /// Desconecta los guilds que llevan `idle_timeout` sin reproducir nada.
    pub async fn idle_sweep(&self) -> usize {
        let timeout = self.inner.settings.idle_timeout;
        let mut disconnected = 0;

        for guild in self.guild_ids() {
            let Some(slot) = self.existing_slot(guild) else {
                continue;
            };
            let voice = {
                let mut state = slot.state.lock();
                let Some(voice) = state.live_voice() else {
                    continue;
                };
                let idle = !voice.is_playing()
                    && !voice.is_paused()
                    && state.queue.current().is_none()
                    && state.last_activity.elapsed() > timeout;
                if !idle {
                    continue;
                }
                state.intentional_disconnect = true;
                voice
            };

            info!("💤 Guild {} inactivo, desconectando", guild);
            voice.disconnect().await;
            let channel = slot.state.lock().voice_channel;
            self.on_voice_disconnected(guild, channel).await;
            disconnected += 1;
        }
        disconnected
    }

    /// Elimina el estado de guilds de los que el bot ya no forma parte.
    pub async fn purge_departed_guilds(&self, active: &HashSet<GuildId>) -> usize {
        let departed: Vec<GuildId> = self
            .guild_ids()
            .into_iter()
            .filter(|g| !active.contains(g))
            .collect();

        for guild in &departed {
            self.forget_guild(*guild).await;
        }
        if !departed.is_empty() {
            info!("🧹 {} guilds abandonados purgados", departed.len());
        }
        departed.len()
    }

    /// Refresca el mensaje de "now playing" de cada guild que esté sonando.
    pub async fn refresh_now_playing_all(&self) {
        for guild in self.guild_ids() {
            self.refresh_now_playing(guild).await;
        }
    }

    pub(crate) async fn refresh_now_playing(&self, guild: GuildId) {
        let Some(slot) = self.existing_slot(guild) else {
            return;
        };
        let settings = &self.inner.settings;

        let eligible = {
            let mut state = slot.state.lock();
            if state.seek.clear_if_expired(settings.seek_watchdog) {
                warn!("⏳ Watchdog de seek vencido en guild {}, bandera liberada", guild);
            }
            let sounding = state
                .live_voice()
                .is_some_and(|v| v.is_playing() || v.is_paused());
            state.queue.current().is_some() && state.now_playing_ready && sounding
        };
        if !eligible {
            return;
        }

        let locked = self
            .inner
            .update_locks
            .get(&guild)
            .is_some_and(|since| since.elapsed() < settings.now_playing_lock);
        if locked {
            return;
        }
        self.inner.update_locks.insert(guild, Instant::now());

        if self.now_playing_message_exists(guild).await {
            let view = {
                let state = slot.state.lock();
                Self::view_of(&state)
            };
            if let Some(view) = view {
                self.inner.notifier.refresh_now_playing(guild, view).await;
            }
        } else {
            debug!("🗑️ Mensaje de now playing desaparecido en guild {}", guild);
            slot.state.lock().now_playing_ready = false;
        }

        self.inner.update_locks.remove(&guild);
    }

    /// Comprueba (con cache corto) que el mensaje sigue existiendo.
    async fn now_playing_message_exists(&self, guild: GuildId) -> bool {
        let ttl = self.inner.settings.message_validation_ttl;
        if let Some(entry) = self.inner.message_validations.get(&guild) {
            let (exists, checked_at) = *entry;
            if checked_at.elapsed() < ttl {
                return exists;
            }
        }

        match self.inner.notifier.now_playing_exists(guild).await {
            Some(exists) => {
                self.inner
                    .message_validations
                    .insert(guild, (exists, Instant::now()));
                exists
            }
            // No se pudo comprobar: se asume que sigue ahí.
            None => true,
        }
    }

    pub fn sweep_validation_cache(&self) -> usize {
        let retention = self.inner.settings.validation_retention;
        let before = self.inner.message_validations.len();
        self.inner
            .message_validations
            .retain(|_, (_, checked_at)| checked_at.elapsed() <= retention);
        before - self.inner.message_validations.len()
    }

    /// Detecta guilds atascados (conectados sin sonar) o huérfanos (sin conexión).
    pub async fn check_voice_health(&self) {
        for guild in self.guild_ids() {
            let Some(slot) = self.existing_slot(guild) else {
                continue;
            };
            // Una transición en curso no es un atasco.
            let Ok(_transition) = slot.play_lock.try_lock() else {
                continue;
            };

            let stalled = {
                let mut state = slot.state.lock();
                if state.seek.is_active(self.inner.settings.seek_watchdog) {
                    continue;
                }
                match state.voice.clone() {
                    Some(voice) if voice.is_connected() => {
                        let stalled = state.queue.current().is_some()
                            && !voice.is_playing()
                            && !voice.is_paused();
                        if stalled {
                            warn!("🩺 Reproducción atascada en guild {}, pasando a la siguiente", guild);
                            state.queue.set_current(None);
                            state.clock.reset();
                        }
                        stalled
                    }
                    Some(_) if state.has_content() => {
                        warn!("🩺 Conexión huérfana en guild {}, descartada", guild);
                        state.voice = None;
                        false
                    }
                    _ => false,
                }
            };

            if stalled {
                self.play_next_locked(guild, &slot).await;
            }
        }
    }
}
