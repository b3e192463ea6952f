use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::grading::{ExecutionMode, GradingPipeline, GradingService};
use crate::services::oracle::OpenAiOracle;
use crate::services::rewards::ProgressionStore;
use crate::services::video_generation::VideoGenerationClient;
use crate::services::video_jobs::{
    InMemoryVideoJobStore, RedisVideoJobStore, VideoJobStore, VideoProvider,
};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

/// Service seams behind trait objects so tests can swap in fakes.
pub(crate) struct Services {
    pub(crate) grading: Arc<GradingService>,
    pub(crate) progression: Arc<dyn ProgressionStore>,
    pub(crate) video_jobs: Arc<dyn VideoJobStore>,
    pub(crate) video_provider: Arc<dyn VideoProvider>,
}

impl Services {
    /// Wires the production implementations. Video jobs stay in process
    /// memory when Redis is not connected.
    pub(crate) async fn from_settings(
        settings: &Settings,
        db: &PgPool,
        redis: &RedisHandle,
    ) -> anyhow::Result<Self> {
        let oracle = Arc::new(OpenAiOracle::from_settings(settings)?);
        let mode = if settings.ai().parallel_calls {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        let pipeline = GradingPipeline::new(oracle, mode, settings.grading().min_content_chars);
        let progression: Arc<dyn ProgressionStore> = Arc::new(db.clone());
        let grading = Arc::new(GradingService::new(
            pipeline,
            Arc::new(db.clone()),
            progression.clone(),
            settings.grading().deadline(),
        ));

        let ttl = settings.video().job_ttl();
        let video_jobs: Arc<dyn VideoJobStore> = if redis.is_connected().await {
            Arc::new(RedisVideoJobStore::new(redis.clone(), ttl))
        } else {
            tracing::warn!("Redis unavailable; video jobs are kept in process memory");
            Arc::new(InMemoryVideoJobStore::new(ttl))
        };
        let video_provider = Arc::new(VideoGenerationClient::from_settings(settings)?);

        Ok(Self { grading, progression, video_jobs, video_provider })
    }
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    services: Services,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        services: Services,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, services }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn grading(&self) -> &GradingService {
        &self.inner.services.grading
    }

    pub(crate) fn progression(&self) -> &dyn ProgressionStore {
        self.inner.services.progression.as_ref()
    }

    pub(crate) fn video_jobs(&self) -> &dyn VideoJobStore {
        self.inner.services.video_jobs.as_ref()
    }

    pub(crate) fn video_provider(&self) -> &dyn VideoProvider {
        self.inner.services.video_provider.as_ref()
    }
}
