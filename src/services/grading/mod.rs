//! Automatic grading of free-text submissions.
//!
//! [`GradingPipeline`] turns one answer into a grade using four oracle
//! sub-reports and fixed guardrails. [`GradingService`] wraps it with the
//! submission store, an overall deadline and the reward hand-off.

mod feedback;
mod pipeline;
mod prompts;
mod reports;
mod scoring;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

pub(crate) use pipeline::{
    AiGrading, AssignmentContext, ExecutionMode, GradingError, GradingOutcome, GradingPipeline,
    Stage,
};
pub(crate) use scoring::LetterGrade;

#[cfg(test)]
pub(crate) use prompts::system_prompt;

use crate::db::types::{ActivityKind, SubmissionStatus};
use crate::services::rewards::{self, AwardEvent, ProgressionStore};
use crate::services::StoreError;

/// A submission loaded together with the assignment it answers.
#[derive(Debug, Clone)]
pub(crate) struct GradingSubject {
    pub(crate) submission_id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) content: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) assignment: AssignmentContext,
}

#[async_trait]
pub(crate) trait SubmissionStore: Send + Sync {
    async fn load_for_grading(&self, submission_id: &str) -> Result<GradingSubject, StoreError>;

    /// Stores the grade and moves the submission to `ai_graded`.
    async fn record_ai_grade(
        &self,
        submission_id: &str,
        outcome: &GradingOutcome,
    ) -> Result<(), StoreError>;

    /// Leaves status and any previous grade in place; adds `flag_reason`.
    async fn record_grading_failure(
        &self,
        submission_id: &str,
        error: &str,
        flag_reason: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradingResponse {
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) grade: Option<LetterGrade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) score: Option<u32>,
    pub(crate) max_points: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ai_grading: Option<AiGrading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl GradingResponse {
    fn graded(outcome: GradingOutcome) -> Self {
        Self {
            success: true,
            grade: Some(outcome.grade),
            score: Some(outcome.score),
            max_points: outcome.max_points,
            feedback: Some(outcome.feedback),
            ai_grading: Some(outcome.ai_grading),
            error: None,
        }
    }

    fn failed(error: String, max_points: u32) -> Self {
        Self {
            success: false,
            grade: None,
            score: None,
            max_points,
            feedback: None,
            ai_grading: None,
            error: Some(error),
        }
    }
}

pub(crate) struct GradingService {
    pipeline: GradingPipeline,
    submissions: Arc<dyn SubmissionStore>,
    progression: Arc<dyn ProgressionStore>,
    deadline: Duration,
}

impl GradingService {
    pub(crate) fn new(
        pipeline: GradingPipeline,
        submissions: Arc<dyn SubmissionStore>,
        progression: Arc<dyn ProgressionStore>,
        deadline: Duration,
    ) -> Self {
        Self { pipeline, submissions, progression, deadline }
    }

    /// Grades a stored submission. Already graded submissions are only
    /// touched when `regrade` is set.
    ///
    /// Grading failures are reported in the response, not as `Err`; only
    /// store failures and a refused re-grade surface as errors.
    pub(crate) async fn grade_submission(
        &self,
        submission_id: &str,
        regrade: bool,
    ) -> Result<GradingResponse, StoreError> {
        let subject = self.submissions.load_for_grading(submission_id).await?;
        if subject.status.is_graded() && !regrade {
            return Err(StoreError::Conflict("Submission is already graded".to_string()));
        }

        let timer = Instant::now();
        let result = match tokio::time::timeout(
            self.deadline,
            self.pipeline.grade(&subject.content, &subject.assignment),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GradingError::DeadlineExceeded { seconds: self.deadline.as_secs() }),
        };
        metrics::histogram!("grading_duration_seconds").record(timer.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                self.submissions.record_ai_grade(submission_id, &outcome).await?;
                metrics::counter!("grading_jobs_total", "status" => "success").increment(1);
                tracing::info!(
                    submission_id,
                    grade = outcome.grade.as_str(),
                    score = outcome.score,
                    max_points = outcome.max_points,
                    confidence = outcome.ai_grading.confidence,
                    "Submission graded"
                );

                self.award_points(&subject, outcome.score).await;
                Ok(GradingResponse::graded(outcome))
            }
            Err(err) => {
                let message = err.to_string();
                self.submissions
                    .record_grading_failure(submission_id, &message, err.flag_reason())
                    .await?;
                metrics::counter!("grading_jobs_total", "status" => "failed").increment(1);
                tracing::warn!(
                    submission_id,
                    flag = err.flag_reason(),
                    error = %message,
                    "Automatic grading failed; submission left for manual review"
                );
                Ok(GradingResponse::failed(message, subject.assignment.max_points))
            }
        }
    }

    async fn award_points(&self, subject: &GradingSubject, score: u32) {
        let event = AwardEvent {
            kind: ActivityKind::Assignment,
            source_id: subject.assignment_id.clone(),
            amount: u64::from(score),
        };
        if let Err(err) =
            rewards::award_activity(self.progression.as_ref(), &subject.student_id, &event).await
        {
            tracing::error!(
                student_id = %subject.student_id,
                submission_id = %subject.submission_id,
                error = %err,
                "Failed to award assignment points"
            );
        }
    }
}
