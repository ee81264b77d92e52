//! HTTP utilities for network store REST calls

use super::error::StoreError;
use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum length of response body to log (to avoid flooding logs with payloads)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

fn method_name(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        _ => "OTHER",
    }
}

/// HTTP client wrapper for network store calls
#[derive(Clone)]
pub struct StoreHttpClient {
    client: Client,
}

impl StoreHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gridcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// GET a JSON document
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        match self.get_optional(url).await? {
            Some(value) => Ok(value),
            None => Err(StoreError::Http {
                method: "GET",
                url: url.to_string(),
                status: StatusCode::NOT_FOUND.as_u16(),
            }
            .into()),
        }
    }

    /// GET a JSON document, mapping 404 to `None`
    pub async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            tracing::error!("Store error: {} - {}", status, sanitize_for_log(&body));
            return Err(StoreError::Http {
                method: "GET",
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let value = serde_json::from_str(&body).context("Failed to parse response JSON")?;
        Ok(Some(value))
    }

    /// POST a JSON body
    pub async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        self.send(Method::POST, url, Some(body)).await
    }

    /// PUT a JSON body
    pub async fn put<B: Serialize + ?Sized>(&self, url: &str, body: Option<&B>) -> Result<()> {
        self.send(Method::PUT, url, body).await
    }

    /// DELETE, optionally carrying a JSON body (batched removals)
    pub async fn delete<B: Serialize + ?Sized>(&self, url: &str, body: Option<&B>) -> Result<()> {
        self.send(Method::DELETE, url, body).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let name = method_name(&method);
        tracing::debug!("{} {}", name, url);

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;
            tracing::error!("Store error: {} - {}", status, sanitize_for_log(&body));
            return Err(StoreError::Http {
                method: name,
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("bad\nrequest\t!"), "badrequest!");
    }

    #[test]
    fn test_sanitize_respects_char_boundaries() {
        let body = "é".repeat(150);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("bytes total"));
    }
}
