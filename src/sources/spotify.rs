use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::MetadataResolver;
use crate::error::{PlayerError, PlayerResult};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const MAX_COLLECTION_ITEMS: usize = 25;

/// Cliente de la Web API de Spotify (client credentials).
///
/// Only used to turn track, playlist and album links into search strings.
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkKind {
    Track,
    Playlist,
    Album,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> PlayerResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.access_token.clone());
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(metadata_error)?
            .json()
            .await
            .map_err(metadata_error)?;

        debug!("🔑 Token de Spotify renovado ({}s)", response.expires_in);
        let access_token = response.access_token.clone();
        *cached = Some(CachedToken {
            access_token: response.access_token,
            // Margen para no usar un token a punto de expirar.
            expires_at: Instant::now() + Duration::from_secs(response.expires_in.saturating_sub(30)),
        });
        Ok(access_token)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> PlayerResult<T> {
        let token = self.access_token().await?;
        self.client
            .get(format!("{}{}", API_BASE, path))
            .bearer_auth(token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(metadata_error)?
            .json()
            .await
            .map_err(metadata_error)
    }
}

#[async_trait]
impl MetadataResolver for SpotifyClient {
    fn handles(&self, query: &str) -> bool {
        parse_link(query).is_some()
    }

    async fn search_terms(&self, query: &str) -> PlayerResult<Vec<String>> {
        let (kind, id) = parse_link(query)
            .ok_or_else(|| PlayerError::Metadata(format!("unsupported Spotify link: {}", query)))?;

        let terms: Vec<String> = match kind {
            LinkKind::Track => {
                let track: SpotifyTrack = self.get(&format!("/tracks/{}", id)).await?;
                search_term(&track).into_iter().collect()
            }
            LinkKind::Playlist => {
                let page: Page<PlaylistItem> = self
                    .get(&format!("/playlists/{}/tracks?limit={}", id, MAX_COLLECTION_ITEMS))
                    .await?;
                page.items
                    .into_iter()
                    .flatten()
                    .filter_map(|item| item.track)
                    .filter_map(|track| search_term(&track))
                    .take(MAX_COLLECTION_ITEMS)
                    .collect()
            }
            LinkKind::Album => {
                let page: Page<SpotifyTrack> = self
                    .get(&format!("/albums/{}/tracks?limit={}", id, MAX_COLLECTION_ITEMS))
                    .await?;
                page.items
                    .into_iter()
                    .flatten()
                    .filter_map(|track| search_term(&track))
                    .take(MAX_COLLECTION_ITEMS)
                    .collect()
            }
        };

        info!("🎧 Spotify {:?} {} → {} términos", kind, id, terms.len());
        Ok(terms)
    }
}

fn metadata_error(e: reqwest::Error) -> PlayerError {
    PlayerError::Metadata(e.to_string())
}

/// "<nombre> <primer artista>", o solo el nombre si no hay artistas.
fn search_term(track: &SpotifyTrack) -> Option<String> {
    let name = track.name.as_deref().filter(|n| !n.is_empty())?;
    match track
        .artists
        .first()
        .and_then(|a| a.name.as_deref())
        .filter(|a| !a.is_empty())
    {
        Some(artist) => Some(format!("{} {}", name, artist)),
        None => {
            warn!("⚠️ Track de Spotify sin artistas: {}", name);
            Some(name.to_string())
        }
    }
}

fn parse_link(query: &str) -> Option<(LinkKind, String)> {
    let url = url::Url::parse(query.trim()).ok()?;
    if !url.host_str()?.ends_with("spotify.com") {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let mut kind_segment = segments.next()?;
    // Enlaces localizados: /intl-es/track/<id>
    if kind_segment.starts_with("intl-") {
        kind_segment = segments.next()?;
    }
    let kind = match kind_segment {
        "track" => LinkKind::Track,
        "playlist" => LinkKind::Playlist,
        "album" => LinkKind::Album,
        _ => return None,
    };
    let id = segments.next()?.to_string();
    Some((kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_supported_links() {
        assert_eq!(
            parse_link("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"),
            Some((LinkKind::Track, "4uLU6hMCjMI75M1A2tKUQC".to_string()))
        );
        assert_eq!(
            parse_link("https://open.spotify.com/intl-es/album/1A2B"),
            Some((LinkKind::Album, "1A2B".to_string()))
        );
        assert_eq!(
            parse_link("https://open.spotify.com/playlist/37i9dQ"),
            Some((LinkKind::Playlist, "37i9dQ".to_string()))
        );
    }

    #[test]
    fn test_rejects_other_links() {
        assert_eq!(parse_link("https://open.spotify.com/artist/123"), None);
        assert_eq!(parse_link("https://www.youtube.com/track/123"), None);
        assert_eq!(parse_link("some search words"), None);
    }

    #[test]
    fn test_search_term_uses_first_artist() {
        let track: SpotifyTrack = serde_json::from_str(
            r#"{"name":"Harder","artists":[{"name":"Daft Punk"},{"name":"Other"}]}"#,
        )
        .unwrap();
        assert_eq!(search_term(&track), Some("Harder Daft Punk".to_string()));

        let lonely: SpotifyTrack = serde_json::from_str(r#"{"name":"Solo"}"#).unwrap();
        assert_eq!(search_term(&lonely), Some("Solo".to_string()));

        let nameless: SpotifyTrack = serde_json::from_str(r#"{"name":null}"#).unwrap();
        assert_eq!(search_term(&nameless), None);
    }
}
