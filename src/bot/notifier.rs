use async_trait::async_trait;
use dashmap::DashMap;
use serenity::all::{ChannelId, CreateMessage, EditMessage, GuildId, Http, MessageId};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::{Alert, NotificationSink, NowPlayingView};
use crate::ui::embeds::{create_alert_embed, create_now_playing_embed};

/// Publica el "now playing" y los avisos en el canal de texto del guild.
pub struct DiscordNotifier {
    http: Arc<Http>,
    messages: DashMap<GuildId, (ChannelId, MessageId)>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            messages: DashMap::new(),
        }
    }
}

fn is_not_found(error: &serenity::Error) -> bool {
    matches!(
        error,
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn show_now_playing(&self, guild: GuildId, channel: ChannelId, view: NowPlayingView) -> bool {
        // Un mensaje nuevo por canción; el anterior se retira.
        self.clear_now_playing(guild).await;

        let message = CreateMessage::new().embed(create_now_playing_embed(&view));
        match channel.send_message(&self.http, message).await {
            Ok(sent) => {
                self.messages.insert(guild, (channel, sent.id));
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo enviar now playing en guild {}: {}", guild, e);
                false
            }
        }
    }

    async fn refresh_now_playing(&self, guild: GuildId, view: NowPlayingView) {
        let Some((channel, message)) = self.messages.get(&guild).map(|e| *e.value()) else {
            return;
        };

        let edit = EditMessage::new().embed(create_now_playing_embed(&view));
        if let Err(e) = channel.edit_message(&self.http, message, edit).await {
            if is_not_found(&e) {
                self.messages.remove(&guild);
            }
            debug!("No se pudo actualizar now playing en guild {}: {}", guild, e);
        }
    }

    async fn now_playing_exists(&self, guild: GuildId) -> Option<bool> {
        let Some((channel, message)) = self.messages.get(&guild).map(|e| *e.value()) else {
            return Some(false);
        };

        match channel.message(&self.http, message).await {
            Ok(_) => Some(true),
            Err(e) if is_not_found(&e) => {
                self.messages.remove(&guild);
                Some(false)
            }
            Err(e) => {
                debug!("Validación de mensaje sin resultado en guild {}: {}", guild, e);
                None
            }
        }
    }

    async fn clear_now_playing(&self, guild: GuildId) {
        let Some((_, (channel, message))) = self.messages.remove(&guild) else {
            return;
        };
        if let Err(e) = channel.delete_message(&self.http, message).await {
            debug!("No se pudo borrar now playing en guild {}: {}", guild, e);
        }
    }

    async fn alert(&self, guild: GuildId, channel: ChannelId, alert: Alert) {
        let message = CreateMessage::new().embed(create_alert_embed(&alert));
        if let Err(e) = channel.send_message(&self.http, message).await {
            warn!("⚠️ No se pudo enviar aviso en guild {}: {}", guild, e);
        }
    }
}
