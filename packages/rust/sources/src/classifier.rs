//! Text-classification service client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use companyinfo_shared::{ClassificationConfig, CompanyInfoError, HttpConfig, Result};

use crate::http::{check_status, classify_send_error, client_builder};

/// Upper bound for one `generateContent` call.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Sends one natural-language instruction and returns the raw text reply.
#[allow(async_fn_in_trait)]
pub trait TextClassifier {
    async fn classify(&self, prompt: &str) -> Result<String>;
}

/// Gemini `generateContent` client.
pub struct GeminiClassifier {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClassifier {
    /// Build a client for `config.model` at `config.endpoint`.
    pub fn new(http: &HttpConfig, config: &ClassificationConfig, api_key: String) -> Result<Self> {
        let client = client_builder(&http.user_agent, GENERATE_TIMEOUT, false)
            .build()
            .map_err(|e| CompanyInfoError::Network(format!("failed to build HTTP client: {e}")))?;

        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

impl TextClassifier for GeminiClassifier {
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn classify(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(&self.url, e))?;

        let status = response.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(300)
                .collect();
            return Err(CompanyInfoError::Classification(format!(
                "HTTP {status}: {detail}"
            )));
        }
        check_status(&self.url, status)?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CompanyInfoError::Classification(format!("invalid response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompanyInfoError::Classification(
                "response carried no text".into(),
            ));
        }
        debug!(reply_len = text.len(), "classification reply received");
        Ok(text)
    }
}
