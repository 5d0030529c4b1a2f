//! Raw page fetching: the one capability the fetchers need from the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::pool::SessionPool;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: u16 },
}

impl FetchError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transport(err) if err.is_timeout() => "timeout",
            Self::Transport(err) if err.is_connect() => "connect",
            Self::Transport(err) if err.is_builder() => "client",
            Self::Transport(err) if err.is_body() || err.is_decode() => "body",
            Self::Transport(_) => "transport",
        }
    }
}

/// Given a URL, return the page body. Any non-success status is an error.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// `PageSource` over real HTTP, one pooled client per request.
pub struct HttpSource {
    pool: Arc<SessionPool>,
}

impl HttpSource {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let session = self.pool.acquire()?;
        let response = session.get(url).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_labelled() {
        let err = FetchError::Status { status: 503 };
        assert_eq!(err.kind(), "status");
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn http_source_releases_client_after_connection_failure() {
        let pool = Arc::new(SessionPool::new(2, "test-agent"));
        let source = HttpSource::new(Arc::clone(&pool));
        // Port 9 on localhost: nothing listens, so the connect fails fast.
        let result = source
            .fetch("http://127.0.0.1:9/", Duration::from_secs(2))
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
        assert_eq!(pool.idle(), 1);
    }
}
