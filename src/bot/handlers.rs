use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info};

use super::controller::Reply;
use crate::{
    audio::player::SongbirdSink,
    bot::TuneQueueBot,
    notify::{ChannelNotifier, FollowupNotifier},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TuneQueueBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            Reply::text("This command can only be used in a server!"),
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let controller = &bot.controller;
    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "skip" => respond(ctx, &command, controller.skip(guild_id).await).await?,
        "stop" => respond(ctx, &command, controller.stop(guild_id).await).await?,
        "pause" => respond(ctx, &command, controller.pause(guild_id).await).await?,
        "resume" => respond(ctx, &command, controller.resume(guild_id).await).await?,
        "queue" => respond(ctx, &command, controller.show_queue(guild_id)).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TuneQueueBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, Reply::text("You need to be in a voice channel first!")).await;
    };

    connect(ctx, bot, guild_id, channel_id, command.channel_id).await?;

    let name = channel_name(ctx, guild_id, channel_id);
    respond(ctx, command, Reply::text(format!("Joined {}", name))).await
}

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TuneQueueBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return followup(ctx, &command, Reply::text("You need to be in a voice channel!")).await;
    };

    // Conectar al canal de voz si no está conectado
    let sequencer = bot.controller.sequencer();
    if sequencer.is_attached(guild_id) {
        // Los avisos siguen al último canal desde el que se usó /play
        let notifier = ChannelNotifier::new(ctx.http.clone(), command.channel_id);
        sequencer.set_notifier(guild_id, Arc::new(notifier));
    } else {
        connect(ctx, bot, guild_id, channel_id, command.channel_id).await?;
    }

    let progress = Arc::new(FollowupNotifier::new(ctx.http.clone(), command.clone()));
    let response = bot.controller.play(guild_id, &query, progress).await;

    followup(ctx, &command, response.reply).await?;

    bot.controller.ensure_playing(guild_id).await;

    Ok(())
}

/// Conecta al canal de voz y registra la sesión de reproducción
async fn connect(
    ctx: &Context,
    bot: &TuneQueueBot,
    guild_id: GuildId,
    channel_id: ChannelId,
    text_channel: ChannelId,
) -> Result<()> {
    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

    if let Err(e) = manager.join(guild_id, channel_id).await {
        error!("Error al conectar al canal de voz: {:?}", e);
        return Err(anyhow::anyhow!("Error al conectar al canal de voz"));
    }

    let sink = SongbirdSink::new(
        manager,
        guild_id,
        bot.http_client.clone(),
        bot.config.default_volume,
    );
    let notifier = ChannelNotifier::new(ctx.http.clone(), text_channel);
    bot.controller
        .attach(guild_id, Arc::new(sink), Arc::new(notifier));

    info!("🔊 Conectado al canal de voz en guild {}", guild_id);
    Ok(())
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let message = match reply {
        Reply::Text(text) => CreateInteractionResponseMessage::new().content(text),
        Reply::Card(card) => CreateInteractionResponseMessage::new().embed(card.to_embed()),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn followup(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let message = match reply {
        Reply::Text(text) => CreateInteractionResponseFollowup::new().content(text),
        Reply::Card(card) => CreateInteractionResponseFollowup::new().embed(card.to_embed()),
    };

    command.create_followup(&ctx.http, message).await?;

    Ok(())
}

// Funciones auxiliares

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn channel_name(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> String {
    guild_id
        .to_guild_cached(&ctx.cache)
        .and_then(|guild| guild.channels.get(&channel_id).map(|c| c.name.clone()))
        .unwrap_or_else(|| format!("<#{}>", channel_id))
}
