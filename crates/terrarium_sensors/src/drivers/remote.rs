//! Values fetched over HTTP.
//!
//! The address is a plain `http`/`https` URL. Without a fragment the response
//! body itself must be a number. With a fragment, the body is parsed as JSON
//! and the fragment is walked as a `/` separated path of object keys and array
//! indices: `http://host/api/sensors#data/0/temperature`.

use crate::config::SensorConfig;
use crate::error::AcquireError;
use log::{debug, error, warn};
use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

/// A parsed remote address.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSource {
    pub url: Url,
    pub path: Vec<String>,
}

impl RemoteSource {
    /// Returns `None` for anything that is not an absolute `http`/`https` URL
    /// with a host.
    pub fn parse(address: &str) -> Option<Self> {
        let mut url = Url::parse(address.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        let path = url
            .fragment()
            .map(|fragment| {
                fragment
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        url.set_fragment(None);
        Some(Self { url, path })
    }

    /// Extracts the reading from a response body.
    pub fn extract(&self, body: &str) -> Result<f64, AcquireError> {
        if self.path.is_empty() {
            return parse_number(body);
        }

        let json: Value = serde_json::from_str(body)
            .map_err(|e| AcquireError::Remote(format!("invalid JSON: {}", e)))?;
        let mut node = &json;
        for segment in &self.path {
            node = match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| {
                AcquireError::Remote(format!("'{}' not found in response", self.path.join("/")))
            })?;
        }

        match node {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| AcquireError::Parse(n.to_string())),
            Value::String(s) => parse_number(s),
            other => Err(AcquireError::Parse(other.to_string())),
        }
    }
}

fn parse_number(text: &str) -> Result<f64, AcquireError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| AcquireError::Parse(text.trim().to_string()))
}

pub struct RemoteDriver {
    address: String,
    source: Option<RemoteSource>,
    timeout: Duration,
}

impl RemoteDriver {
    /// Never fails: an unusable URL is reported on every read instead, so the
    /// sensor can be fixed without being recreated.
    pub(super) fn bind(address: &str, config: &SensorConfig) -> Self {
        let source = RemoteSource::parse(address);
        if source.is_none() {
            warn!("Remote url '{}' is not a valid remote source url", address);
        }
        Self {
            address: address.to_string(),
            source,
            timeout: config.remote_timeout,
        }
    }

    pub(super) fn acquire(&mut self) -> Result<f64, AcquireError> {
        let Some(source) = &self.source else {
            error!("Remote url '{}' is not a valid remote source url!", self.address);
            return Err(AcquireError::Remote(format!("invalid url '{}'", self.address)));
        };

        debug!("Fetching {}", source.url);
        let client = Client::builder().timeout(self.timeout).build()?;
        let body = client
            .get(source.url.clone())
            .send()?
            .error_for_status()?
            .text()?;
        source.extract(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answers a single HTTP request with `status` and `body`.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    fn driver(address: &str) -> RemoteDriver {
        RemoteDriver::bind(address, &SensorConfig::test_mode())
    }

    #[test]
    fn test_parse_source() {
        let source = RemoteSource::parse("https://example.com/api#data/0/value").unwrap();
        assert_eq!(source.url.as_str(), "https://example.com/api");
        assert_eq!(source.path, vec!["data", "0", "value"]);

        assert!(RemoteSource::parse("http://example.com/t").unwrap().path.is_empty());
        assert!(RemoteSource::parse("ftp://example.com/t").is_none());
        assert!(RemoteSource::parse("file:///tmp/t").is_none());
        assert!(RemoteSource::parse("example.com/t").is_none());
    }

    #[test]
    fn test_extract_json_path() {
        let source = RemoteSource::parse("http://h/#sensors/1/temp").unwrap();
        let body = r#"{"sensors": [{"temp": 1.0}, {"temp": 24.75}]}"#;
        assert_eq!(source.extract(body).unwrap(), 24.75);

        let source = RemoteSource::parse("http://h/#reading").unwrap();
        assert_eq!(source.extract(r#"{"reading": " 61.5 "}"#).unwrap(), 61.5);
        assert!(source.extract(r#"{"other": 1}"#).is_err());
        assert!(source.extract(r#"{"reading": null}"#).is_err());
        assert!(source.extract("not json").is_err());
    }

    #[test]
    fn test_acquire_plain_body() {
        let url = serve_once("200 OK", "23.5\n");
        assert_eq!(driver(&format!("{}/temperature", url)).acquire().unwrap(), 23.5);
    }

    #[test]
    fn test_acquire_json_body() {
        let url = serve_once("200 OK", r#"{"climate": {"humidity": 72}}"#);
        let mut remote = driver(&format!("{}/status#climate/humidity", url));
        assert_eq!(remote.acquire().unwrap(), 72.0);
    }

    #[test]
    fn test_acquire_http_error() {
        let url = serve_once("500 Internal Server Error", "");
        assert!(matches!(
            driver(&url).acquire(),
            Err(AcquireError::Remote(_))
        ));
    }

    #[test]
    fn test_invalid_url_fails_every_read() {
        let mut remote = driver("not a url");
        assert!(remote.acquire().is_err());
        assert!(remote.acquire().is_err());
    }
}
