// External conversion service client - last resort after chain exhaustion
//
// One request, one answer, no retries: a failure here terminates the whole
// extraction with an aggregate failure. The call gets its own longer timeout
// since external services may queue work.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::ExtractError;

/// Narrow seam for the third-party conversion API, so it can be mocked or
/// disabled independently.
#[async_trait]
pub trait FallbackService: Send + Sync {
    /// Ask the service to convert the source and return a direct link to the
    /// converted file.
    async fn convert(&self, url: &str) -> Result<String, ExtractError>;
}

#[derive(Serialize)]
struct ConvertRequest<'a> {
    url: &'a str,
    format: &'a str,
    quality: &'a str,
}

#[derive(Deserialize)]
struct ConvertResponse {
    download_url: Option<String>,
    error: Option<String>,
}

pub struct ConvertApiClient {
    endpoint: String,
    client: reqwest::Client,
}

impl ConvertApiClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl FallbackService for ConvertApiClient {
    async fn convert(&self, url: &str) -> Result<String, ExtractError> {
        debug!("asking external service to convert {}", url);
        let request = ConvertRequest {
            url,
            format: "mp3",
            quality: "192",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExtractError::ExternalService(format!(
                "conversion endpoint returned {}",
                response.status()
            )));
        }
        let body: ConvertResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(ExtractError::ExternalService(error));
        }
        body.download_url
            .ok_or_else(|| ExtractError::ExternalService("response carried no download link".into()))
    }
}

/// Streamed transfer of a remote link into a store file. Used for the
/// external fallback's converted artifact.
pub async fn download_to_file(
    client: &reqwest::Client,
    link: &str,
    dest: &Path,
) -> Result<(), ExtractError> {
    let response = client.get(link).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering every request with the given body.
    async fn spawn_http(body: &'static str, content_type: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        content_type,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn convert_parses_download_link() {
        let endpoint = spawn_http(
            r#"{"download_url":"http://cdn.example/file.mp3"}"#,
            "application/json",
        )
        .await;
        let client = ConvertApiClient::new(&endpoint, Duration::from_secs(2)).unwrap();
        let link = client.convert("https://youtu.be/abc").await.unwrap();
        assert_eq!(link, "http://cdn.example/file.mp3");
    }

    #[tokio::test]
    async fn convert_surfaces_service_error() {
        let endpoint = spawn_http(r#"{"error":"unsupported video"}"#, "application/json").await;
        let client = ConvertApiClient::new(&endpoint, Duration::from_secs(2)).unwrap();
        let err = client.convert("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, ExtractError::ExternalService(_)));
    }

    #[tokio::test]
    async fn convert_rejects_linkless_response() {
        let endpoint = spawn_http("{}", "application/json").await;
        let client = ConvertApiClient::new(&endpoint, Duration::from_secs(2)).unwrap();
        assert!(client.convert("https://youtu.be/abc").await.is_err());
    }

    #[tokio::test]
    async fn download_streams_body_to_disk() {
        let source = spawn_http("converted audio bytes", "audio/mpeg").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.mp3");
        let client = reqwest::Client::new();
        download_to_file(&client, &format!("{}/x.mp3", source), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"converted audio bytes");
    }
}
