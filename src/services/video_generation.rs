use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::services::video_jobs::{ProviderJob, VideoJobError, VideoJobStatus, VideoProvider};

const MAX_SUBMIT_RETRIES: u32 = 2;

/// HTTP client for the external video-generation API.
#[derive(Debug, Clone)]
pub(crate) struct VideoGenerationClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_base_delay: Duration,
}

impl VideoGenerationClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.video().base_url,
            &settings.video().api_key,
            Duration::from_secs(settings.video().request_timeout),
            Duration::from_secs(1),
        )
    }

    pub(crate) fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        retry_base_delay: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("Failed to build video provider HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_base_delay,
        })
    }

    async fn read_job(&self, response: reqwest::Response) -> Result<ProviderJob, VideoJobError> {
        let status = response.status();
        let raw_body = response
            .text()
            .await
            .map_err(|err| VideoJobError::Provider(format!("failed to read response: {err}")))?;
        let parsed: Value = serde_json::from_str(&raw_body).map_err(|err| {
            VideoJobError::Provider(format!("non-JSON body (status {status}): {err}"))
        })?;

        if !status.is_success() {
            return Err(VideoJobError::Provider(format!(
                "request failed (status {status}): {}",
                extract_error_message(&parsed)
            )));
        }

        parse_provider_job(&parsed).ok_or_else(|| {
            VideoJobError::Provider("response is missing the job id".to_string())
        })
    }
}

#[async_trait]
impl VideoProvider for VideoGenerationClient {
    async fn submit(&self, lesson_title: &str, prompt: &str) -> Result<ProviderJob, VideoJobError> {
        let endpoint = format!("{}/videos", self.base_url);
        let payload = json!({"title": lesson_title, "prompt": prompt});
        let mut last_error = None;

        for attempt in 0..=MAX_SUBMIT_RETRIES {
            let response = self
                .client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(VideoJobError::Provider(format!(
                        "submit failed (status {})",
                        response.status()
                    )));
                }
                Ok(response) => return self.read_job(response).await,
                Err(err) => {
                    last_error = Some(VideoJobError::Provider(format!("submit failed: {err}")));
                }
            }

            if attempt < MAX_SUBMIT_RETRIES {
                let backoff = self.retry_base_delay.saturating_mul(2_u32.pow(attempt));
                tracing::warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying video submit"
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| VideoJobError::Provider("unknown submit error".to_string())))
    }

    async fn status(&self, provider_job_id: &str) -> Result<ProviderJob, VideoJobError> {
        let response = self
            .client
            .get(format!("{}/videos/{}", self.base_url, provider_job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| VideoJobError::Provider(format!("status check failed: {err}")))?;

        self.read_job(response).await
    }
}

fn parse_provider_job(payload: &Value) -> Option<ProviderJob> {
    let id = payload
        .get("id")
        .and_then(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })?;

    let status = match payload
        .get("status")
        .and_then(Value::as_str)
        .map(|value| value.to_ascii_lowercase())
        .as_deref()
    {
        Some("completed" | "complete" | "succeeded" | "done") => VideoJobStatus::Completed,
        Some("failed" | "error" | "cancelled") => VideoJobStatus::Failed,
        Some("processing" | "running" | "in_progress") => VideoJobStatus::Processing,
        _ => VideoJobStatus::Queued,
    };

    let video_url = payload
        .get("video_url")
        .or_else(|| payload.get("url"))
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let error = payload.get("error").and_then(Value::as_str).map(ToString::to_string);

    Some(ProviderJob { id, status, video_url, error })
}

fn extract_error_message(payload: &Value) -> String {
    payload
        .get("detail")
        .and_then(Value::as_str)
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}
