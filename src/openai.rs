//! Minimal HTTP client for OpenAI-compatible JSON endpoints.
//!
//! Shared by the embeddings client ([`crate::embedding`]) and the chat
//! completions client ([`crate::llm`]). The API key is supplied on every
//! request rather than held by the client.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! `max_retries` defaults to 0, so by default every failure surfaces on the
//! first attempt.

use anyhow::{bail, Context, Result};
use reqwest::header::HeaderValue;
use std::time::Duration;

use crate::config::OpenAIConfig;
use crate::models::Credential;

#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl OpenAIClient {
    pub fn new(config: &OpenAIConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body to `{base_url}/{path}` and return the parsed JSON
    /// response.
    pub async fn post_json(
        &self,
        credential: &Credential,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let auth = bearer_header(credential)?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, %url, "retrying OpenAI request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, auth.clone())
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .with_context(|| format!("Invalid JSON from {}", url))?;
                        return Ok(json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::Error::new(e).context(format!("Request to {} failed", url)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OpenAI request failed after retries")))
    }
}

/// Build the `Authorization` header for a credential.
///
/// Fails for empty keys and for keys containing characters that cannot
/// appear in an HTTP header (newlines, control characters).
pub fn bearer_header(credential: &Credential) -> Result<HeaderValue> {
    if credential.is_empty() {
        bail!("API key must not be empty");
    }

    let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| anyhow::anyhow!("API key contains invalid characters"))?;
    value.set_sensitive(true);
    Ok(value)
}
