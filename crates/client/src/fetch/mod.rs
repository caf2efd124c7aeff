//! HTTP fetch pipeline backing the controller's network collaborator.
//!
//! ### Behavior
//! - Any HTTP status is returned as a response; deciding what a 404 means is
//!   the controller's job.
//! - Transport failures map to `NETWORK_ERROR`, timeouts to `FETCH_TIMEOUT`.
//! - Max redirects: 5
//! - Max body bytes: 20MB (configurable)

pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, header};

pub use self::url::{UrlError, canonicalize, resolve};

use swcache_core::{Error, Network, Request, Response};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "swcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 20MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "swcache/0.1".to_string(),
            max_bytes: 20 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

/// HTTP client implementing [`Network`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

/// Flatten response headers, keeping the last value of repeated names and
/// skipping values that are not visible ASCII.
fn collect_headers(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = request.url.as_str();

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {}", request.method)))?;

        let mut builder = self.http.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| transport_error(url, e))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = collect_headers(response.headers());

        let body = response.bytes().await.map_err(|e| transport_error(url, e))?;
        if body.len() > self.config.max_bytes {
            return Err(self.too_large(body.len()));
        }

        tracing::debug!(
            url,
            final_url = %final_url,
            status,
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(Response { url: final_url, status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swcache_core::Destination;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP/1.1 response on a random local port.
    async fn serve_once(raw: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(raw.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request(url: &str) -> Request {
        Request::parse(url, Destination::Style).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "swcache/0.1");
        assert_eq!(config.max_bytes, 20 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_collect_headers() {
        let mut map = header::HeaderMap::new();
        map.insert(header::CONTENT_TYPE, "text/css".parse().unwrap());
        map.insert(header::ETAG, "\"abc\"".parse().unwrap());
        let headers = collect_headers(&map);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/css"));
        assert_eq!(headers.get("etag").map(String::as_str), Some("\"abc\""));
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/css\r\nContent-Length: 6\r\nConnection: close\r\n\r\nbody{}",
        )
        .await;
        let client = FetchClient::new(FetchConfig::default()).unwrap();

        let response = client.fetch(&request(&format!("{base}/css/styles.css"))).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("text/css"));
        assert_eq!(response.body.as_ref(), b"body{}");
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_response() {
        let base = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let client = FetchClient::new(FetchConfig::default()).unwrap();

        let response = client.fetch(&request(&format!("{base}/missing.css"))).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789",
        )
        .await;
        let client = FetchClient::new(FetchConfig { max_bytes: 4, ..Default::default() }).unwrap();

        let result = client.fetch(&request(&format!("{base}/big"))).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let result = client.fetch(&request(&format!("http://{addr}/index.html"))).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_invalid_method() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let mut req = request("http://127.0.0.1:9/");
        req.method = "BAD METHOD".into();
        assert!(matches!(client.fetch(&req).await, Err(Error::InvalidInput(_))));
    }
}
