use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Identifier;
use crate::error::HarvestError;
use crate::fetcher::Transport;
use crate::retry::TransportError;

pub fn build_client(timeout: Duration) -> Result<Client, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("gene-harvest/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| HarvestError::HttpClient(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| HarvestError::HttpClient(err.to_string()))
}

const STATUS_MESSAGE_LIMIT: usize = 200;

/// Turns a non-2xx response into `TransportError::Status`, keeping the start
/// of the body as the message.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .map(|body| status_message(&body))
        .unwrap_or_else(|_| "request failed".to_string());
    Err(TransportError::Status { status, message })
}

fn status_message(body: &str) -> String {
    let body = body.trim();
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(STATUS_MESSAGE_LIMIT).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Single GET per attempt: `base_url?<query...>&<id_param>=<identifier>`.
#[derive(Clone)]
pub struct DirectTransport {
    client: Client,
    base_url: String,
    query: Vec<(String, String)>,
    id_param: String,
}

impl DirectTransport {
    pub fn new(client: Client, base_url: impl Into<String>, id_param: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            query: Vec::new(),
            id_param: id_param.into(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch_once(&self, identifier: &Identifier) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query)
            .query(&[(self.id_param.as_str(), identifier.as_str())])
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(TransportError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_error_bodies_are_cut() {
        let page = format!("<html>{}</html>", "x".repeat(5000));
        let message = status_message(&page);
        assert_eq!(message.chars().count(), STATUS_MESSAGE_LIMIT + 3);
        assert!(message.starts_with("<html>xxx"));
        assert!(message.ends_with("..."));
    }

    #[test]
    fn short_error_bodies_are_kept() {
        assert_eq!(status_message("  invalid access key\n"), "invalid access key");
        assert_eq!(status_message(&"é".repeat(200)), "é".repeat(200));
    }
}
