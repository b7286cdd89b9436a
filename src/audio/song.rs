use serde::{Deserialize, Serialize};
use std::{fmt, hash::Hash, str::FromStr};

use crate::sources::TrackInfo;

/// Una canción en la cola.
///
/// Identity is the stable `webpage_url`; `url` is the extracted stream location
/// and expires, so it is refreshed before every physical play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub webpage_url: String,
    #[serde(default = "unknown_title")]
    pub title: String,
    /// Duración en segundos; 0 cuando es desconocida (streams en vivo).
    #[serde(default)]
    pub duration: u64,
    #[serde(default = "unknown")]
    pub uploader: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default = "unknown")]
    pub requested_by: String,
}

fn unknown_title() -> String {
    "Unknown Title".to_string()
}

fn unknown() -> String {
    "Unknown".to_string()
}

impl Song {
    pub fn from_track(info: TrackInfo, requested_by: impl Into<String>) -> Self {
        Self {
            url: info.url.unwrap_or_default(),
            webpage_url: info.webpage_url,
            title: info.title,
            duration: info.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            uploader: info.uploader.unwrap_or_else(unknown),
            thumbnail: info.thumbnail.unwrap_or_default(),
            requested_by: requested_by.into(),
        }
    }

    /// Actualiza la URL de stream y la metadata con datos recién extraídos.
    pub fn refresh_from(&mut self, info: &TrackInfo) {
        if let Some(url) = &info.url {
            self.url = url.clone();
        }
        if !info.title.is_empty() {
            self.title = info.title.clone();
        }
        if let Some(duration) = info.duration.filter(|d| *d > 0.0) {
            self.duration = duration as u64;
        }
        if let Some(thumbnail) = info.thumbnail.as_ref().filter(|t| !t.is_empty()) {
            self.thumbnail = thumbnail.clone();
        }
        if let Some(uploader) = info.uploader.as_ref().filter(|u| !u.is_empty()) {
            self.uploader = uploader.clone();
        }
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.webpage_url == other.webpage_url
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.webpage_url.hash(state);
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "**{}** by {}", self.title, self.uploader)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Song,
    Queue,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopMode::Off => "Off",
            LoopMode::Song => "Song",
            LoopMode::Queue => "Queue",
        };
        f.write_str(name)
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "song" | "track" => Ok(LoopMode::Song),
            "queue" => Ok(LoopMode::Queue),
            other => Err(format!("unknown loop mode '{}'", other)),
        }
    }
}
