use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{Alert, LoopMode, NowPlayingView, QueuePage};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Resonance";

const PROGRESS_SEGMENTS: usize = 20;

/// Crea el embed de "now playing" con barra de progreso
pub fn create_now_playing_embed(view: &NowPlayingView) -> CreateEmbed {
    let song = &view.song;
    let status = if view.paused { "⏸️ En Pausa" } else { "🎵 Reproduciendo Ahora" };

    let timeline = if song.duration > 0 {
        format!(
            "{} `{} / {}`",
            progress_bar(view.position, song.duration),
            format_duration(view.position),
            format_duration(song.duration)
        )
    } else {
        format!("🔴 En vivo `{}`", format_duration(view.position))
    };

    let mut embed = CreateEmbed::default()
        .title(status)
        .description(format!("**{}**\n\n{}", song.title, timeline))
        .color(if view.paused { colors::WARNING_ORANGE } else { colors::SUCCESS_GREEN })
        .field("🎤 Artista", &song.uploader, true)
        .field("👤 Solicitado por", &song.requested_by, true)
        .field("🔊 Volumen", format!("{}%", view.volume), true)
        .field("🔁 Repetición", loop_label(view.loop_mode), true)
        .field("🔀 Aleatorio", if view.shuffle { "Sí" } else { "No" }, true)
        .field("📋 En cola", view.queue_len.to_string(), true);

    if let Some(next) = &view.next_title {
        embed = embed.field("⏭️ Siguiente", next, false);
    }
    if !song.thumbnail.is_empty() {
        embed = embed.thumbnail(&song.thumbnail);
    }
    if song.webpage_url.starts_with("http") {
        embed = embed.url(&song.webpage_url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de un aviso del motor
pub fn create_alert_embed(alert: &Alert) -> CreateEmbed {
    let (emoji, color) = match alert {
        Alert::SongSkipped { .. } => ("⚠️", colors::WARNING_ORANGE),
        Alert::SeekFailed { restarted: true } => ("⚠️", colors::WARNING_ORANGE),
        Alert::PlaybackHalted | Alert::ConnectionLost | Alert::SeekFailed { .. } => {
            ("❌", colors::ERROR_RED)
        }
    };

    CreateEmbed::default()
        .title(format!("{} {}", emoji, alert.title()))
        .description(alert.to_string())
        .color(color)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar una página de la cola
pub fn create_queue_embed(page: &QueuePage, loop_mode: LoopMode) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut description = String::new();
    for (i, song) in page.items.iter().enumerate() {
        description.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            page.first_position + i,
            song.title,
            format_duration(song.duration)
        ));
    }

    let info = format!(
        "**Total:** {} canciones • **Duración:** {} • {}",
        page.total_items,
        format_duration(page.total_duration),
        loop_label(loop_mode)
    );

    embed
        .description(description)
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Resonance",
            page.current_page, page.total_pages
        )))
        .timestamp(Timestamp::now())
}

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "➡️ Desactivada",
        LoopMode::Song => "🔂 Canción",
        LoopMode::Queue => "🔁 Cola",
    }
}

/// Barra de progreso de 20 segmentos con un marcador en la posición actual.
pub fn progress_bar(position: u64, duration: u64) -> String {
    if duration == 0 {
        return "▬".repeat(PROGRESS_SEGMENTS);
    }
    let ratio = position.min(duration) as f64 / duration as f64;
    let marker = ((ratio * PROGRESS_SEGMENTS as f64) as usize).min(PROGRESS_SEGMENTS - 1);

    (0..PROGRESS_SEGMENTS)
        .map(|i| if i == marker { "🔘" } else { "▬" })
        .collect()
}

/// Formatea segundos como `M:SS` o `H:MM:SS`
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
