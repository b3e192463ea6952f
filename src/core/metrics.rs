use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once per process; later calls reuse it.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("grading_jobs_total", "Grading runs by outcome");
    metrics::describe_histogram!("grading_duration_seconds", "Wall time of a grading run");
    metrics::describe_counter!("oracle_requests_total", "Oracle HTTP calls by outcome");
    metrics::describe_counter!("oracle_retries_total", "Oracle calls retried after HTTP 429");
    metrics::describe_counter!("progression_level_ups_total", "Levels gained by students");
    metrics::describe_counter!("badges_awarded_total", "Badges granted by level-up");
    metrics::describe_counter!("video_jobs_total", "Video generation jobs by status");
}
