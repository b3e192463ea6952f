//! Video-lesson generation jobs.
//!
//! Jobs live in a keyed store with a TTL so they survive restarts and are
//! visible to every instance. The provider does the actual rendering; this
//! module only submits work and mirrors its status.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::redis::RedisHandle;

const KEY_PREFIX: &str = "video-job:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum VideoJobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl VideoJobStatus {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoJob {
    pub(crate) id: String,
    pub(crate) requested_by: String,
    pub(crate) lesson_title: String,
    pub(crate) prompt: String,
    pub(crate) status: VideoJobStatus,
    pub(crate) provider_job_id: Option<String>,
    pub(crate) video_url: Option<String>,
    pub(crate) error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub(crate) enum VideoJobError {
    #[error("video job store unavailable: {0}")]
    Store(String),
    #[error("video provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub(crate) trait VideoJobStore: Send + Sync {
    async fn save(&self, job: &VideoJob) -> Result<(), VideoJobError>;
    async fn get(&self, id: &str) -> Result<Option<VideoJob>, VideoJobError>;
}

/// What the provider reports about one of its jobs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProviderJob {
    pub(crate) id: String,
    pub(crate) status: VideoJobStatus,
    pub(crate) video_url: Option<String>,
    pub(crate) error: Option<String>,
}

#[async_trait]
pub(crate) trait VideoProvider: Send + Sync {
    async fn submit(&self, lesson_title: &str, prompt: &str) -> Result<ProviderJob, VideoJobError>;
    async fn status(&self, provider_job_id: &str) -> Result<ProviderJob, VideoJobError>;
}

pub(crate) struct RedisVideoJobStore {
    redis: RedisHandle,
    ttl: Duration,
}

impl RedisVideoJobStore {
    pub(crate) fn new(redis: RedisHandle, ttl: Duration) -> Self {
        Self { redis, ttl }
    }
}

#[async_trait]
impl VideoJobStore for RedisVideoJobStore {
    async fn save(&self, job: &VideoJob) -> Result<(), VideoJobError> {
        let payload =
            serde_json::to_string(job).map_err(|err| VideoJobError::Store(err.to_string()))?;
        self.redis
            .set_with_ttl(&format!("{KEY_PREFIX}{}", job.id), &payload, self.ttl.as_secs())
            .await
            .map_err(|err| VideoJobError::Store(err.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<VideoJob>, VideoJobError> {
        let raw = self
            .redis
            .get(&format!("{KEY_PREFIX}{id}"))
            .await
            .map_err(|err| VideoJobError::Store(err.to_string()))?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| VideoJobError::Store(err.to_string())),
            None => Ok(None),
        }
    }
}

/// Single-instance store used when Redis is not reachable.
pub(crate) struct InMemoryVideoJobStore {
    ttl: Duration,
    jobs: Mutex<HashMap<String, (VideoJob, Instant)>>,
}

impl InMemoryVideoJobStore {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self { ttl, jobs: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl VideoJobStore for InMemoryVideoJobStore {
    async fn save(&self, job: &VideoJob) -> Result<(), VideoJobError> {
        let mut jobs = self.jobs.lock().await;
        let now = Instant::now();
        jobs.retain(|_, (_, expires_at)| *expires_at > now);
        jobs.insert(job.id.clone(), (job.clone(), now + self.ttl));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<VideoJob>, VideoJobError> {
        let mut jobs = self.jobs.lock().await;
        let now = Instant::now();
        match jobs.get(id) {
            Some((job, expires_at)) if *expires_at > now => Ok(Some(job.clone())),
            Some(_) => {
                jobs.remove(id);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Records a new job and hands it to the provider.
///
/// A provider rejection is stored on the job as `failed` rather than
/// returned, so the caller can still look the job up.
pub(crate) async fn start_job(
    store: &dyn VideoJobStore,
    provider: &dyn VideoProvider,
    requested_by: &str,
    lesson_title: &str,
    prompt: &str,
) -> Result<VideoJob, VideoJobError> {
    let now = OffsetDateTime::now_utc();
    let mut job = VideoJob {
        id: Uuid::new_v4().to_string(),
        requested_by: requested_by.to_string(),
        lesson_title: lesson_title.to_string(),
        prompt: prompt.to_string(),
        status: VideoJobStatus::Queued,
        provider_job_id: None,
        video_url: None,
        error: None,
        created_at: now,
        updated_at: now,
    };
    store.save(&job).await?;

    match provider.submit(lesson_title, prompt).await {
        Ok(remote) => {
            job.provider_job_id = Some(remote.id.clone());
            apply_remote(&mut job, remote);
        }
        Err(err) => {
            tracing::warn!(job_id = %job.id, error = %err, "Video provider rejected job");
            job.status = VideoJobStatus::Failed;
            job.error = Some(err.to_string());
        }
    }
    job.updated_at = OffsetDateTime::now_utc();
    store.save(&job).await?;

    metrics::counter!("video_jobs_total", "status" => job.status.as_str()).increment(1);
    tracing::info!(job_id = %job.id, status = job.status.as_str(), "Video job started");
    Ok(job)
}

/// Returns the stored job, first syncing its status from the provider when
/// it is still running.
pub(crate) async fn refresh_job(
    store: &dyn VideoJobStore,
    provider: &dyn VideoProvider,
    id: &str,
) -> Result<Option<VideoJob>, VideoJobError> {
    let Some(mut job) = store.get(id).await? else {
        return Ok(None);
    };
    if job.status.is_terminal() {
        return Ok(Some(job));
    }
    let Some(provider_job_id) = job.provider_job_id.clone() else {
        return Ok(Some(job));
    };

    match provider.status(&provider_job_id).await {
        Ok(remote) => {
            let previous = job.status;
            apply_remote(&mut job, remote);
            if job.status != previous {
                job.updated_at = OffsetDateTime::now_utc();
                store.save(&job).await?;
                if job.status.is_terminal() {
                    metrics::counter!("video_jobs_total", "status" => job.status.as_str())
                        .increment(1);
                }
            }
        }
        Err(err) => {
            // Transient provider errors leave the job as it was.
            tracing::warn!(job_id = %job.id, error = %err, "Failed to refresh video job");
        }
    }

    Ok(Some(job))
}

fn apply_remote(job: &mut VideoJob, remote: ProviderJob) {
    job.status = remote.status;
    if remote.video_url.is_some() {
        job.video_url = remote.video_url;
    }
    if remote.error.is_some() {
        job.error = remote.error;
    }
}
