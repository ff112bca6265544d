//! Post summarization through the Gemini generateContent endpoint.

use log::error;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("not_configured")]
    NotConfigured,
    #[error("too_short")]
    TooShort,
    #[error("upstream: {0}")]
    Upstream(String),
}

pub struct Summarizer {
    client: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: String,
}

impl Summarizer {
    pub fn new(api_key: Option<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            api_url: api_url.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Summarize a post. Content under 5 characters (after whitespace
    /// normalization) is rejected; under 50 characters gets a one-sentence
    /// prompt instead of the standard 2-3 sentence one.
    pub async fn summarize(&self, title: &str, content: &str) -> Result<String, SummaryError> {
        let key = self.api_key.as_ref().ok_or(SummaryError::NotConfigured)?;

        let clean = content.replace('\n', " ");
        let clean = clean.trim();
        if clean.len() < 5 {
            return Err(SummaryError::TooShort);
        }
        let prompt = if clean.len() < 50 {
            format!(
                "Summarize this very short blog post in one sentence.\n\nTitle: {title}\n\nContent: {clean}"
            )
        } else {
            format!(
                "Summarize the following blog post in 2-3 concise sentences, focusing on the key points.\n\nTitle: {title}\n\nContent: {clean}"
            )
        };

        let url = format!("{}?key={}", self.api_url, key);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SummaryError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            error!("summary upstream returned {status}");
            return Err(SummaryError::Upstream(format!("status {status}")));
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::Upstream(e.to_string()))?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .ok_or_else(|| SummaryError::Upstream("empty candidate list".into()))
    }
}
