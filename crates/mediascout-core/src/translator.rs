//! Text translation used to fill the translated title and plot.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::BoxFuture;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("translation service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("translation service error: {0}")]
    Service(String),
}

pub trait Translator: Send + Sync {
    /// Translate `text` from `src` to `dst`. `src` may be `"auto"`.
    fn translate<'a>(
        &'a self,
        text: &'a str,
        src: &'a str,
        dst: &'a str,
    ) -> BoxFuture<'a, Result<String, TranslateError>>;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTranslator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Translator for HttpTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        src: &'a str,
        dst: &'a str,
    ) -> BoxFuture<'a, Result<String, TranslateError>> {
        Box::pin(async move {
            let body = TranslateRequest {
                q: text,
                source: src,
                target: dst,
                format: "text",
                api_key: self.api_key.as_deref(),
            };
            let resp = self
                .client
                .post(&self.endpoint)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(TranslateError::Status(status));
            }

            let parsed: TranslateResponse = resp.json().await?;
            match (parsed.translated_text, parsed.error) {
                (Some(text), _) => Ok(text),
                (None, Some(err)) => Err(TranslateError::Service(err)),
                (None, None) => Err(TranslateError::Service("empty response".into())),
            }
        })
    }
}
