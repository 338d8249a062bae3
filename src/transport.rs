//! HTTP transport used by the job client.

use crate::config::ClientConfig;
use crate::error::{Result, TryOnError};
use crate::types::ImageAsset;
use async_trait::async_trait;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The network calls a job needs.
///
/// Implementations return `Ok` for any HTTP status and reserve `Err` for
/// failures where no response arrived, already classified.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one file as `multipart/form-data`.
    async fn upload(&self, url: &str, asset: &ImageAsset) -> Result<HttpResponse>;

    /// Sends a JSON body with POST.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse>;

    /// Fetches a URL with GET, reading the whole body.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the timeouts and user agent from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.io_timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| TryOnError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn collect(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload(&self, url: &str, asset: &ImageAsset) -> Result<HttpResponse> {
        let part = reqwest::multipart::Part::bytes(asset.data().to_vec())
            .file_name(asset.filename().to_string())
            .mime_str(asset.mime_type())
            .map_err(|e| TryOnError::InvalidInput(format!("bad MIME type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("files", part);

        let response = self.client.post(url).multipart(form).send().await?;
        Self::collect(response).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse> {
        let response = self.client.post(url).json(body).send().await?;
        Self::collect(response).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        Self::collect(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(302, "").is_success());
        assert!(!HttpResponse::new(429, "").is_success());
    }

    #[test]
    fn test_response_json() {
        let resp = HttpResponse::new(200, r#"{"event_id": "abc"}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["event_id"], "abc");
    }

    #[test]
    fn test_response_json_malformed() {
        let resp = HttpResponse::new(200, "<html>");
        let err = resp.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, TryOnError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_post_json_sends_one_content_type() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers ended");
                request.extend_from_slice(&buf[..n]);
            }
            let body = r#"{"event_id":"e"}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_lowercase()
        });

        let config = ClientConfig::builder()
            .base_url(format!("http://{addr}"))
            .fallback_urls(Vec::<String>::new())
            .build()
            .unwrap();
        let response = HttpTransport::new(&config)
            .unwrap()
            .post_json(&format!("http://{addr}/queue/join"), &serde_json::json!({"data": []}))
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let request = server.await.unwrap();
        assert_eq!(request.matches("content-type: application/json").count(), 1);
    }

    #[test]
    fn test_http_transport_builds() {
        let config = ClientConfig::builder()
            .base_url("http://localhost:7860")
            .fallback_urls(Vec::<String>::new())
            .build()
            .unwrap();
        assert!(HttpTransport::new(&config).is_ok());
    }
}
