pub mod probe;
pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PlayerResult;

pub use probe::{HttpStreamValidator, StreamValidator};
pub use spotify::SpotifyClient;
pub use ytdlp::YtDlpExtractor;

/// Metadata de un track tal como la entrega el servicio de extracción.
///
/// `url` is the direct stream location. A missing `url` means the extraction
/// did not produce anything playable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub url: Option<String>,
    pub webpage_url: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
}

impl TrackInfo {
    pub fn is_playable(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Resultado de resolver una búsqueda o URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Track(TrackInfo),
    Playlist(Vec<TrackInfo>),
}

impl Resolved {
    /// Primer track utilizable del resultado.
    pub fn first(&self) -> Option<&TrackInfo> {
        match self {
            Resolved::Track(track) => Some(track),
            Resolved::Playlist(tracks) => tracks.first(),
        }
    }

    pub fn into_tracks(self) -> Vec<TrackInfo> {
        match self {
            Resolved::Track(track) => vec![track],
            Resolved::Playlist(tracks) => tracks,
        }
    }
}

/// Servicio que convierte una búsqueda o URL en metadata reproducible.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn resolve(&self, query: &str) -> PlayerResult<Option<Resolved>>;
}

/// Resolver secundario para enlaces de terceros (p. ej. Spotify).
///
/// Maps an external link to the search strings the extractor understands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    fn handles(&self, query: &str) -> bool;

    async fn search_terms(&self, query: &str) -> PlayerResult<Vec<String>>;
}

/// Extractor compuesto: enlaces de terceros pasan por el resolver de
/// metadata y cada término resultante se busca en el extractor principal.
pub struct QueryResolver {
    extractor: Arc<dyn Extractor>,
    metadata: Option<Arc<dyn MetadataResolver>>,
    spacing: Duration,
}

impl QueryResolver {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            metadata: None,
            spacing: Duration::from_millis(100),
        }
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataResolver>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    async fn resolve_terms(&self, terms: Vec<String>) -> PlayerResult<Option<Resolved>> {
        let single = terms.len() == 1;
        let mut tracks = Vec::with_capacity(terms.len());

        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.spacing).await;
            }
            match self.extractor.resolve(term).await {
                Ok(Some(resolved)) => {
                    if let Some(track) = resolved.into_tracks().into_iter().next() {
                        tracks.push(track);
                    }
                }
                Ok(None) => debug!("🔍 Sin resultados para: {}", term),
                Err(e) => warn!("⚠️ Falló la búsqueda de '{}': {}", term, e),
            }
        }

        Ok(match (single, tracks.len()) {
            (_, 0) => None,
            (true, _) => tracks.pop().map(Resolved::Track),
            (false, _) => Some(Resolved::Playlist(tracks)),
        })
    }
}

#[async_trait]
impl Extractor for QueryResolver {
    async fn resolve(&self, query: &str) -> PlayerResult<Option<Resolved>> {
        if let Some(metadata) = self.metadata.as_ref().filter(|m| m.handles(query)) {
            let terms = metadata.search_terms(query).await?;
            info!("🎧 Enlace externo convertido en {} búsquedas", terms.len());
            return self.resolve_terms(terms).await;
        }

        self.extractor.resolve(query).await
    }
}

/// Indica si la consulta es una URL y no un texto de búsqueda.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlayerError;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn track(id: &str) -> TrackInfo {
        TrackInfo {
            url: Some(format!("https://cdn.example/{id}")),
            webpage_url: format!("https://www.youtube.com/watch?v={id}"),
            title: id.to_string(),
            duration: Some(100.0),
            thumbnail: None,
            uploader: None,
        }
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://youtu.be/abc"));
        assert!(is_url("  http://example.com/a.mp3 "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/file"));
    }

    #[test]
    fn test_missing_url_is_not_playable() {
        let mut info = track("a");
        assert!(info.is_playable());
        info.url = Some(String::new());
        assert!(!info.is_playable());
        info.url = None;
        assert!(!info.is_playable());
    }

    #[tokio::test]
    async fn test_plain_queries_go_straight_to_extractor() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_resolve()
            .with(eq("lofi beats"))
            .times(1)
            .returning(|_| Ok(Some(Resolved::Track(track("lofi")))));

        let mut metadata = MockMetadataResolver::new();
        metadata.expect_handles().return_const(false);
        metadata.expect_search_terms().never();

        let resolver = QueryResolver::new(Arc::new(extractor)).with_metadata(Arc::new(metadata));
        let resolved = resolver.resolve("lofi beats").await.unwrap();
        assert_eq!(resolved, Some(Resolved::Track(track("lofi"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_playlist_searches_each_term() {
        let mut extractor = MockExtractor::new();
        extractor.expect_resolve().returning(|term| match term {
            "missing" => Ok(None),
            "broken" => Err(PlayerError::Extraction("broken".into())),
            other => Ok(Some(Resolved::Track(track(other)))),
        });

        let mut metadata = MockMetadataResolver::new();
        metadata.expect_handles().return_const(true);
        metadata.expect_search_terms().returning(|_| {
            Ok(vec!["one".into(), "missing".into(), "broken".into(), "two".into()])
        });

        let resolver = QueryResolver::new(Arc::new(extractor)).with_metadata(Arc::new(metadata));
        let resolved = resolver
            .resolve("https://open.spotify.com/playlist/xyz")
            .await
            .unwrap();

        assert_eq!(resolved, Some(Resolved::Playlist(vec![track("one"), track("two")])));
    }

    #[tokio::test]
    async fn test_external_single_track_stays_a_track() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_resolve()
            .returning(|term| Ok(Some(Resolved::Playlist(vec![track(term)]))));

        let mut metadata = MockMetadataResolver::new();
        metadata.expect_handles().return_const(true);
        metadata
            .expect_search_terms()
            .returning(|_| Ok(vec!["song artist".into()]));

        let resolver = QueryResolver::new(Arc::new(extractor)).with_metadata(Arc::new(metadata));
        let resolved = resolver.resolve("https://open.spotify.com/track/1").await.unwrap();
        assert_eq!(resolved, Some(Resolved::Track(track("song artist"))));
    }
}
