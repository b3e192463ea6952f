use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;
use crate::services::grading::GradingResponse;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmissionCreate {
    #[validate(length(min = 1, max = 20000, message = "content must be 1-20000 characters"))]
    pub(crate) content: String,
    #[serde(default)]
    #[validate(length(max = 10, message = "at most 10 attachments are allowed"))]
    pub(crate) attachments: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) content: String,
    pub(crate) attachments: Vec<String>,
    pub(crate) status: SubmissionStatus,
    pub(crate) grade: Option<String>,
    pub(crate) score: Option<i32>,
    pub(crate) max_points: i32,
    pub(crate) feedback: Option<String>,
    pub(crate) ai_grading: Option<serde_json::Value>,
    pub(crate) flag_reasons: Vec<String>,
    pub(crate) graded_by: Option<String>,
    pub(crate) graded_at: Option<String>,
    pub(crate) submitted_at: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            student_id: submission.student_id,
            content: submission.content,
            attachments: submission.attachments.0,
            status: submission.status,
            grade: submission.grade,
            score: submission.score,
            max_points: submission.max_points,
            feedback: submission.feedback,
            ai_grading: submission.ai_grading.map(|value| value.0),
            flag_reasons: submission.flag_reasons.0,
            graded_by: submission.graded_by,
            graded_at: format_optional(submission.graded_at),
            submitted_at: format_primitive(submission.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) submission: SubmissionResponse,
    pub(crate) grading: GradingResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ManualGradeRequest {
    #[validate(range(min = 0, message = "score must not be negative"))]
    pub(crate) score: i32,
    /// Letter grade; derived from the percentage when omitted.
    #[serde(default)]
    #[validate(length(min = 1, max = 2, message = "grade must be a letter grade"))]
    pub(crate) grade: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000, message = "feedback must be at most 5000 characters"))]
    pub(crate) feedback: Option<String>,
}
