//! Chat-completions client used as the grading oracle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;
use crate::services::rate_limit::TokenBucket;

#[derive(Debug, Clone)]
pub(crate) struct OracleRequest {
    pub(crate) system: String,
    pub(crate) user: String,
}

#[derive(Debug, Error)]
pub(crate) enum OracleError {
    #[error("oracle rate limit persisted after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle transport failure: {0}")]
    Transport(String),
}

/// A text-generation backend. Replies are free text expected to contain JSON.
#[async_trait]
pub(crate) trait TextOracle: Send + Sync {
    async fn complete(&self, request: OracleRequest) -> Result<String, OracleError>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OpenAiOracle {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    retry: RetryPolicy,
    limiter: Arc<TokenBucket>,
}

impl OpenAiOracle {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let ai = settings.ai();
        let limiter = Arc::new(TokenBucket::new(ai.burst, ai.min_interval()));
        let retry = RetryPolicy { max_retries: ai.max_retries, base_delay: ai.retry_base_delay() };

        Self::new(
            &ai.openai_base_url,
            &ai.openai_api_key,
            &ai.ai_model,
            ai.request_timeout(),
            retry,
            limiter,
        )
        .map(|oracle| oracle.with_sampling(ai.ai_max_tokens, ai.ai_temperature))
    }

    pub(crate) fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
        limiter: Arc<TokenBucket>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("Failed to build oracle HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: 1500,
            temperature: 0.2,
            retry,
            limiter,
        })
    }

    fn with_sampling(mut self, max_tokens: u32, temperature: f64) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl TextOracle for OpenAiOracle {
    async fn complete(&self, request: OracleRequest) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let timer = Instant::now();
        let mut attempt = 0;
        let body = loop {
            self.limiter.acquire().await;

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await
                .map_err(|err| {
                    metrics::counter!("oracle_requests_total", "outcome" => "transport_error")
                        .increment(1);
                    OracleError::Transport(err.to_string())
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                metrics::counter!("oracle_requests_total", "outcome" => "rate_limited").increment(1);
                if attempt >= self.retry.max_retries {
                    return Err(OracleError::RateLimited { attempts: attempt + 1 });
                }

                let delay = self.retry.delay_for(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "Oracle rate limited; backing off");
                metrics::counter!("oracle_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                metrics::counter!("oracle_requests_total", "outcome" => "http_error").increment(1);
                let body = response.text().await.unwrap_or_default();
                return Err(OracleError::Status { status: status.as_u16(), body: truncate(&body, 500) });
            }

            break response.json::<Value>().await.ok();
        };

        metrics::counter!("oracle_requests_total", "outcome" => "success").increment(1);

        // A refusal or a broken envelope still counts as an answer; the
        // grading stage falls back to its default report.
        let content = body
            .as_ref()
            .and_then(|body| body.get("choices"))
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if content.is_empty() {
            tracing::warn!(model = %self.model, "Oracle reply carried no message content");
        }

        tracing::debug!(
            model = %self.model,
            attempts = attempt + 1,
            duration_ms = timer.elapsed().as_millis() as u64,
            response_chars = content.len(),
            "Oracle completion received"
        );

        Ok(content.to_string())
    }
}

/// Returns the first balanced JSON object in `text`, ignoring any prose or
/// code fences around it.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (index, &byte) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..=index];
                        if serde_json::from_str::<Value>(candidate).is_ok() {
                            return Some(candidate);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }

        search_from = start + 1;
    }

    None
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push('…');
    out
}
