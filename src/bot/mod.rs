//! # Bot Module
//!
//! Puente entre el gateway de Discord y el motor de reproducción.
//!
//! [`ResonanceBot`] implements Serenity's [`EventHandler`]. It never mutates
//! guild state itself: voice state changes for the bot's own user become
//! [`EngineEvent`]s, and everything else is delegated to [`MusicEngine`].
//!
//! - [`voice`]: songbird-backed voice transport
//! - [`notifier`]: embeds posted to the guild's text channel

use parking_lot::Mutex;
use serenity::{
    all::{Cache, ChannelId, Context, EventHandler, GuildId, Ready, UnavailableGuild, VoiceState},
    async_trait,
    model::guild::Guild,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod notifier;
pub mod voice;

pub use notifier::DiscordNotifier;
pub use voice::SongbirdTransport;

use crate::audio::{BackgroundTimers, EngineEvent, GuildMembership, MusicEngine};
use crate::config::TimerSettings;

/// Main Discord event handler.
pub struct ResonanceBot {
    engine: MusicEngine,
    timer_settings: TimerSettings,
    shutdown: CancellationToken,
    timers: Mutex<Option<BackgroundTimers>>,
}

impl ResonanceBot {
    pub fn new(engine: MusicEngine, timer_settings: TimerSettings, shutdown: CancellationToken) -> Self {
        Self {
            engine,
            timer_settings,
            shutdown,
            timers: Mutex::new(None),
        }
    }
}

/// Traduce un cambio de voz del propio bot a un evento del motor.
pub fn voice_event_for(
    guild: GuildId,
    before: Option<ChannelId>,
    after: Option<ChannelId>,
) -> Option<EngineEvent> {
    match (before, after) {
        (before, None) => Some(EngineEvent::VoiceDisconnected { guild, channel: before }),
        (None, Some(channel)) => Some(EngineEvent::VoiceConnected { guild, channel }),
        (Some(_), Some(channel)) => {
            debug!("🔀 Bot movido al canal {} en guild {}", channel, guild);
            None
        }
    }
}

/// Membresía de guilds según la cache de serenity.
pub struct CacheMembership(pub Arc<Cache>);

impl GuildMembership for CacheMembership {
    fn active_guilds(&self) -> Option<HashSet<GuildId>> {
        let guilds = self.0.guilds();
        (!guilds.is_empty()).then(|| guilds.into_iter().collect())
    }
}

#[async_trait]
impl EventHandler for ResonanceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let restored = self.engine.restore_snapshots().await;
        if restored > 0 {
            info!("📂 {} colas restauradas", restored);
        }

        // `ready` se repite tras cada reconexión del gateway.
        let mut timers = self.timers.lock();
        if timers.is_none() {
            *timers = Some(BackgroundTimers::spawn(
                self.engine.clone(),
                Arc::new(CacheMembership(ctx.cache.clone())),
                self.timer_settings.clone(),
                self.shutdown.child_token(),
            ));
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        let Some(guild) = new.guild_id else {
            return;
        };
        let before = old.and_then(|s| s.channel_id);
        let Some(event) = voice_event_for(guild, before, new.channel_id) else {
            return;
        };

        info!("🔌 Cambio de voz del bot: {:?}", event);
        if self.engine.event_sender().send(event).is_err() {
            warn!("⚠️ Bucle del motor cerrado, evento de voz descartado");
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            debug!("Guild {} no disponible temporalmente", incomplete.id);
            return;
        }
        if self.engine.forget_guild(incomplete.id).await {
            info!("👋 El bot salió del guild {}", incomplete.id);
        }
    }
}
