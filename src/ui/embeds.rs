use serenity::{
    all::{Colour, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::sources::TrackMetadata;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 TuneQueue";

/// Entradas visibles en "Up Next"
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Discord rechaza valores de campo de más de 1024 caracteres
const FIELD_VALUE_LIMIT: usize = 1024;
const TITLE_LIMIT: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct CardField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Mensaje estructurado independiente de Discord; se convierte a `CreateEmbed` al enviarlo
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub title: String,
    pub color: Colour,
    pub fields: Vec<CardField>,
}

impl Card {
    pub fn new(title: impl Into<String>, color: Colour) -> Self {
        Self {
            title: title.into(),
            color,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(CardField {
            name: name.into(),
            value: truncate(&value.into(), FIELD_VALUE_LIMIT),
            inline,
        });
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    pub fn to_embed(&self) -> CreateEmbed {
        self.fields
            .iter()
            .fold(
                CreateEmbed::default().title(&self.title).color(self.color),
                |embed, field| embed.field(&field.name, &field.value, field.inline),
            )
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

fn duration_suffix(metadata: &TrackMetadata) -> String {
    metadata
        .duration_label()
        .map(|label| format!(" ({})", label))
        .unwrap_or_default()
}

/// Tarjeta de la cola: canción actual, hasta 10 siguientes y el resto contado.
/// `upcoming` son las primeras entradas de la cola (`None` = aún sin metadata).
pub fn create_queue_card(
    now_playing: Option<&TrackMetadata>,
    upcoming: &[Option<TrackMetadata>],
    queue_len: usize,
) -> Card {
    let now_playing = match now_playing {
        Some(track) => format!("🎵 {}{}", truncate(&track.title, TITLE_LIMIT), duration_suffix(track)),
        None => "*Nothing is playing*".to_string(),
    };

    let up_next = if queue_len == 0 {
        "*No songs in queue*".to_string()
    } else {
        upcoming
            .iter()
            .take(QUEUE_PAGE_SIZE)
            .enumerate()
            .map(|(index, entry)| match entry {
                Some(track) => format!(
                    "`{}.` {}{}",
                    index + 1,
                    truncate(&track.title, TITLE_LIMIT),
                    duration_suffix(track)
                ),
                None => format!("`{}.` Loading...", index + 1),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut card = Card::new("🎵 Music Queue", colors::INFO_BLUE)
        .field("Now Playing", now_playing, false)
        .field("Up Next", up_next, false);

    if queue_len > QUEUE_PAGE_SIZE {
        card = card.field(
            "And more...",
            format!("*{} more songs in queue*", queue_len - QUEUE_PAGE_SIZE),
            false,
        );
    }

    card
}

/// Tarjeta de canción agregada
pub fn create_track_added_card(track: &TrackMetadata) -> Card {
    let card = Card::new("🎵 Track Added to Queue", colors::INFO_BLUE).field(
        "Title",
        &track.title,
        false,
    );

    match track.duration_label() {
        Some(duration) => card.field("Duration", duration, true),
        None => card,
    }
}

/// Tarjeta de playlist agregada (las canciones encoladas de inmediato)
pub fn create_playlist_added_card(titles: &[String]) -> Card {
    let card = Card::new("📑 Playlist Added to Queue", colors::SUCCESS_GREEN).field(
        "Tracks Added",
        format!("{} songs", titles.len()),
        false,
    );

    if titles.len() > 5 {
        let list = titles
            .iter()
            .take(5)
            .map(|title| format!("• {}", title))
            .collect::<Vec<_>>()
            .join("\n");
        card.field(
            "First 5 Tracks",
            format!("{}\n*...and {} more*", list, titles.len() - 5),
            false,
        )
    } else {
        let list = titles
            .iter()
            .map(|title| format!("• {}", title))
            .collect::<Vec<_>>()
            .join("\n");
        card.field("Track List", list, false)
    }
}
