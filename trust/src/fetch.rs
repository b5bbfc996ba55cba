//! Artifact fetching over HTTPS
//!
//! Any fetch failure (connection error, non-success status, timeout)
//! means the artifact is unreachable. The orchestrator downgrades that
//! to a skipped verification rather than a failure.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("artifact exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Capability: given a URL, return its bytes or report it unreachable
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches artifacts with reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        // Content-Length is advisory; chunked bodies carry none
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Request(e.to_string())
            }
        })? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new("registry-test/0.1.0", Duration::from_secs(5), 1024).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip bytes".to_vec()))
            .mount(&server)
            .await;

        let bytes = fetcher()
            .fetch(&format!("{}/plugin.zip", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"zip bytes");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/plugin.zip", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_oversized_artifact_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/big.zip", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_artifact_at_limit_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
            .mount(&server)
            .await;

        let bytes = fetcher()
            .fetch(&format!("{}/exact.zip", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes.len(), 1024);
    }

    /// Serves one chunked response with no Content-Length header
    async fn serve_chunked(chunks: usize, chunk_len: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = vec![b'x'; chunk_len];
            for _ in 0..chunks {
                let frame = [
                    format!("{:x}\r\n", chunk_len).into_bytes(),
                    chunk.clone(),
                    b"\r\n".to_vec(),
                ]
                .concat();
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        format!("http://{}/stream.zip", addr)
    }

    #[tokio::test]
    async fn test_chunked_body_without_length_is_capped() {
        let url = serve_chunked(64, 256).await;

        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_small_chunked_body_accepted() {
        let url = serve_chunked(3, 100).await;

        let bytes = fetcher().fetch(&url).await.unwrap();
        assert_eq!(bytes.len(), 300);
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let slow = HttpFetcher::new("registry-test/0.1.0", Duration::from_millis(200), 1024)
            .unwrap();
        let err = slow
            .fetch(&format!("{}/plugin.zip", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }
}
