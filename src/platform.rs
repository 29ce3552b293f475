use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Source site inferred from the shape of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    TikTok,
    YouTube,
    Instagram,
    Unknown,
}

/// Checked in order; the first matching needle wins.
const PLATFORM_MARKERS: &[(&[&str], Platform)] = &[
    (&["tiktok.com"], Platform::TikTok),
    (&["youtube.com", "youtu.be"], Platform::YouTube),
    (&["instagram.com"], Platform::Instagram),
];

/// Classify a URL by case-sensitive substring match. Never fails.
pub fn classify(url: &str) -> Platform {
    PLATFORM_MARKERS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| url.contains(needle)))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Unknown)
}

impl Platform {
    pub const ALL: [Platform; 4] = [Self::TikTok, Self::YouTube, Self::Instagram, Self::Unknown];

    /// Tag used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TikTok => "tiktok",
            Self::YouTube => "youtube",
            Self::Instagram => "instagram",
            Self::Unknown => "unknown",
        }
    }

    /// Tag with its first letter upper-cased ("Tiktok", "Youtube", ...).
    pub fn display_name(&self) -> String {
        let tag = self.as_str();
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Deadline used when no operator override is configured.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::TikTok => Duration::from_secs(30),
            Self::YouTube => Duration::from_secs(45),
            Self::Instagram => Duration::from_secs(35),
            Self::Unknown => Duration::from_secs(20),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
