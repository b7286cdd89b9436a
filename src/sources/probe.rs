use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Comprueba que una URL de stream responde antes de reproducirla.
///
/// A failed probe is advisory: the caller logs it and plays anyway, since the
/// extraction itself already succeeded.
#[async_trait]
pub trait StreamValidator: Send + Sync {
    async fn validate(&self, url: &str) -> bool;
}

/// Validador basado en una petición HEAD.
pub struct HttpStreamValidator {
    client: Client,
}

impl HttpStreamValidator {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StreamValidator for HttpStreamValidator {
    async fn validate(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) if is_stream_status(response.status()) => {
                debug!("✅ Stream accesible ({})", response.status());
                true
            }
            Ok(response) => {
                warn!("⚠️ Validación de URL falló: estado {}", response.status());
                false
            }
            Err(e) => {
                warn!("⚠️ Validación de URL falló: {}", e);
                false
            }
        }
    }
}

fn is_stream_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::OK | StatusCode::PARTIAL_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_full_and_partial_content_count_as_reachable() {
        assert!(is_stream_status(StatusCode::OK));
        assert!(is_stream_status(StatusCode::PARTIAL_CONTENT));
        assert!(!is_stream_status(StatusCode::FORBIDDEN));
        assert!(!is_stream_status(StatusCode::FOUND));
    }
}
