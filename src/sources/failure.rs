use std::fmt;
use thiserror::Error;

/// Causa clasificada de un fallo de resolución
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnsupportedUrl,
    AgeRestricted,
    GeoRestricted,
    Unavailable,
    DrmProtected,
    Network,
    Unknown,
}

/// Tabla ordenada (subcadena, clasificación). Gana la primera coincidencia;
/// las subcadenas van en minúsculas.
pub const CLASSIFICATION_TABLE: &[(&str, FailureKind)] = &[
    ("[drm]", FailureKind::DrmProtected),
    ("drm protection", FailureKind::DrmProtected),
    ("video unavailable", FailureKind::Unavailable),
    ("private video", FailureKind::Unavailable),
    ("sign in to confirm your age", FailureKind::AgeRestricted),
    ("age-restricted", FailureKind::AgeRestricted),
    ("not a supported url", FailureKind::UnsupportedUrl),
    ("unsupported url", FailureKind::UnsupportedUrl),
    ("geo restriction", FailureKind::GeoRestricted),
    ("not available in your country", FailureKind::GeoRestricted),
    ("network error", FailureKind::Network),
    ("connection error", FailureKind::Network),
    ("timed out", FailureKind::Network),
];

impl FailureKind {
    /// Clasifica el texto de error crudo del extractor (sin distinguir mayúsculas)
    pub fn classify(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        CLASSIFICATION_TABLE
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(FailureKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedUrl => "unsupported_url",
            FailureKind::AgeRestricted => "age_restricted",
            FailureKind::GeoRestricted => "geo_restricted",
            FailureKind::Unavailable => "unavailable",
            FailureKind::DrmProtected => "drm_protected",
            FailureKind::Network => "network",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallo de resolución con su causa clasificada y el mensaje original
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct ResolutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ResolutionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Construye el fallo clasificando el texto crudo
    pub fn from_raw(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify(&message),
            message,
        }
    }

    /// Mensaje visible para el usuario, nombrando la causa cuando se conoce
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::DrmProtected => "❌ Could not find a playable alternative.\n\n\
                Try these options instead:\n\
                • Use a regular YouTube link\n\
                • Search by song name and artist\n\
                • Try SoundCloud or other non-DRM sources"
                .to_string(),
            FailureKind::Unavailable => "⚠️ This video is unavailable or private.".to_string(),
            FailureKind::AgeRestricted => "⚠️ This content is age-restricted.".to_string(),
            FailureKind::UnsupportedUrl => {
                "⚠️ This URL is not supported. Try using a direct link to the content.".to_string()
            }
            FailureKind::GeoRestricted => {
                "⚠️ This content is not available in the current region.".to_string()
            }
            FailureKind::Network => {
                "⚠️ Network error occurred. Please check your connection and try again."
                    .to_string()
            }
            FailureKind::Unknown => format!("⚠️ Error loading content: {}", self.message),
        }
    }
}
