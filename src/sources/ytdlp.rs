use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::{process::Command, sync::Semaphore, time::timeout};
use tracing::{debug, error, info, warn};

use super::{is_url, Extractor, Resolved, TrackInfo};
use crate::error::{PlayerError, PlayerResult};

const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio[abr<=128]/bestaudio/best";

/// Extractor basado en el binario `yt-dlp`.
///
/// Every invocation holds a permit of a small semaphore, which bounds how many
/// extractor processes run at once.
pub struct YtDlpExtractor {
    binary: String,
    user_agent: String,
    workers: Semaphore,
    timeout: Duration,
    attempts: u32,
    retry_delay: Duration,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>, user_agent: impl Into<String>, workers: usize) -> Self {
        Self {
            binary: binary.into(),
            user_agent: user_agent.into(),
            workers: Semaphore::new(workers.max(1)),
            timeout: Duration::from_secs(60),
            attempts: 2,
            retry_delay: Duration::from_secs(1),
        }
    }

    fn target_for(query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    async fn run_once(&self, target: &str) -> PlayerResult<Value> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| PlayerError::Extraction("extractor pool closed".into()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-J",
            "--flat-playlist",
            "--no-warnings",
            "--quiet",
            "--no-check-certificate",
            "--socket-timeout",
            "30",
            "--retries",
            "10",
            "--age-limit",
            "18",
            "-f",
            AUDIO_FORMAT,
            "--user-agent",
            &self.user_agent,
            target,
        ])
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| PlayerError::Extraction(format!("yt-dlp timed out for {}", target)))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::Extraction(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn resolve(&self, query: &str) -> PlayerResult<Option<Resolved>> {
        let target = Self::target_for(query);
        let is_search = target.starts_with("ytsearch");
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            debug!("🔍 yt-dlp intento {} para: {}", attempt, target);
            match self.run_once(&target).await {
                Ok(value) => return Ok(parse_output(&value, is_search)),
                Err(e) => {
                    warn!("⚠️ Intento {} de extracción falló: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PlayerError::Extraction(target)))
    }
}

/// Convierte la salida JSON de yt-dlp en un resultado.
///
/// Search results collapse to their first usable entry. Playlists keep every
/// usable entry, without stream URLs: those are extracted right before playing.
fn parse_output(value: &Value, is_search: bool) -> Option<Resolved> {
    match value.get("entries").and_then(Value::as_array) {
        Some(entries) => {
            let mut tracks = entries.iter().filter_map(normalize_entry);
            if is_search {
                tracks.next().map(Resolved::Track)
            } else {
                let tracks: Vec<TrackInfo> = tracks.collect();
                info!("🎵 Playlist extraída con {} tracks", tracks.len());
                (!tracks.is_empty()).then_some(Resolved::Playlist(tracks))
            }
        }
        None => normalize_entry(value).map(Resolved::Track),
    }
}

fn normalize_entry(entry: &Value) -> Option<TrackInfo> {
    let text = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let title = text("title").or_else(|| text("alt_title"))?;
    let url = text("url");
    let webpage_url = text("webpage_url")
        .or_else(|| url.clone().filter(|u| u.starts_with("http")))
        .or_else(|| text("id").map(|id| format!("https://www.youtube.com/watch?v={}", id)))?;

    // Entradas planas: `url` apunta a la página, no al stream.
    let is_flat = entry.get("_type").and_then(Value::as_str) == Some("url");
    let url = if is_flat { None } else { url };

    Some(TrackInfo {
        url,
        webpage_url,
        title,
        duration: entry.get("duration").and_then(Value::as_f64),
        thumbnail: text("thumbnail"),
        uploader: text("uploader").or_else(|| text("channel")),
    })
}

/// Verifica que las herramientas externas estén instaladas.
pub async fn verify_dependencies(ytdlp: &str, ffmpeg: &str) -> anyhow::Result<()> {
    for (binary, flag) in [(ytdlp, "--version"), (ffmpeg, "-version")] {
        match Command::new(binary).arg(flag).output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!(
                    "✅ {} disponible: {}",
                    binary,
                    version.lines().next().unwrap_or_default()
                );
            }
            Ok(output) => {
                error!("❌ {} no pudo ejecutarse ({})", binary, output.status);
                anyhow::bail!("{} is installed but not runnable", binary);
            }
            Err(e) => {
                error!("❌ {} no está instalado o no está en PATH: {}", binary, e);
                anyhow::bail!("{} is not available", binary);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_search_queries_are_prefixed() {
        assert_eq!(YtDlpExtractor::target_for(" daft punk "), "ytsearch1:daft punk");
        assert_eq!(
            YtDlpExtractor::target_for("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }

    #[test]
    fn test_single_video_keeps_stream_url() {
        let value = json!({
            "id": "abc",
            "title": "Song",
            "url": "https://rr1.googlevideo.com/stream",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "duration": 215.0,
            "uploader": "Artist",
        });

        let Some(Resolved::Track(track)) = parse_output(&value, false) else {
            panic!("expected a single track");
        };
        assert_eq!(track.url.as_deref(), Some("https://rr1.googlevideo.com/stream"));
        assert_eq!(track.duration, Some(215.0));
        assert_eq!(track.uploader.as_deref(), Some("Artist"));
    }

    #[test]
    fn test_entry_normalization_fills_identity() {
        let from_id = json!({ "id": "xyz", "alt_title": "Alt" });
        let track = normalize_entry(&from_id).unwrap();
        assert_eq!(track.title, "Alt");
        assert_eq!(track.webpage_url, "https://www.youtube.com/watch?v=xyz");

        assert!(normalize_entry(&json!({ "id": "no-title" })).is_none());
        assert!(normalize_entry(&json!({ "title": "no identity" })).is_none());
    }

    #[test]
    fn test_flat_playlist_entries_have_no_stream_url() {
        let value = json!({
            "_type": "playlist",
            "entries": [
                { "_type": "url", "id": "a", "title": "A", "url": "https://www.youtube.com/watch?v=a" },
                { "_type": "url", "id": "b", "title": null },
                { "_type": "url", "id": "c", "title": "C" },
            ]
        });

        let Some(Resolved::Playlist(tracks)) = parse_output(&value, false) else {
            panic!("expected a playlist");
        };
        let ids: Vec<&str> = tracks.iter().map(|t| t.webpage_url.as_str()).collect();
        assert_eq!(
            ids,
            vec!["https://www.youtube.com/watch?v=a", "https://www.youtube.com/watch?v=c"]
        );
        assert!(tracks.iter().all(|t| t.url.is_none()));
    }

    #[test]
    fn test_search_collapses_to_first_usable_entry() {
        let value = json!({
            "entries": [
                { "id": "bad" },
                { "_type": "url", "id": "good", "title": "Good" },
            ]
        });
        let resolved = parse_output(&value, true);
        assert_eq!(resolved.and_then(|r| r.first().map(|t| t.title.clone())), Some("Good".into()));
        assert!(parse_output(&json!({ "entries": [] }), true).is_none());
    }
}
