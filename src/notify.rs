//! Avisos de texto hacia el canal donde se originó una acción.

use async_trait::async_trait;
use serenity::all::{ChannelId, CommandInteraction, CreateInteractionResponseFollowup, Http};
use std::sync::Arc;
use tracing::warn;

/// Destino de avisos de texto (canal de Discord, followup de una interacción)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: String);
}

/// Envía mensajes a un canal de texto
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, message: String) {
        if let Err(e) = self.channel_id.say(&self.http, message).await {
            warn!("⚠️ No se pudo enviar mensaje al canal {}: {:?}", self.channel_id, e);
        }
    }
}

/// Responde como followup de una interacción ya diferida
pub struct FollowupNotifier {
    http: Arc<Http>,
    interaction: CommandInteraction,
}

impl FollowupNotifier {
    pub fn new(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self { http, interaction }
    }
}

#[async_trait]
impl Notifier for FollowupNotifier {
    async fn notify(&self, message: String) {
        let followup = CreateInteractionResponseFollowup::new().content(message);
        if let Err(e) = self.interaction.create_followup(&self.http, followup).await {
            warn!("⚠️ No se pudo enviar followup: {:?}", e);
        }
    }
}
