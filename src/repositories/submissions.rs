use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;
use crate::services::grading::{AssignmentContext, GradingOutcome, GradingSubject, SubmissionStore};
use crate::services::StoreError;

const COLUMNS: &str = "\
    id, assignment_id, student_id, content, attachments, content_hash, status, grade, score, \
    max_points, feedback, ai_grading, flag_reasons, graded_at, graded_by, submitted_at, \
    created_at, updated_at";

/// Flags cleared once automatic grading succeeds.
const GRADING_FAILURE_FLAGS: [&str; 3] =
    ["grading_error", "insufficient_content", "invalid_assignment"];

pub(crate) fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.trim().as_bytes()))
}

pub(crate) struct CreateSubmission<'a> {
    pub(crate) id: &'a str,
    pub(crate) assignment_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) content: &'a str,
    pub(crate) attachments: &'a [String],
    pub(crate) status: SubmissionStatus,
    pub(crate) max_points: i32,
    pub(crate) submitted_at: PrimitiveDateTime,
}

/// Inserts a submission. Returns `None` when the student already submitted
/// this assignment.
pub(crate) async fn create(
    pool: &PgPool,
    params: CreateSubmission<'_>,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (
            id, assignment_id, student_id, content, attachments, content_hash, status,
            max_points, submitted_at, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $9)
         ON CONFLICT (assignment_id, student_id) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.assignment_id)
    .bind(params.student_id)
    .bind(params.content)
    .bind(Json(params.attachments))
    .bind(content_hash(params.content))
    .bind(params.status)
    .bind(params.max_points)
    .bind(params.submitted_at)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct ManualGrade<'a> {
    pub(crate) grade: &'a str,
    pub(crate) score: i32,
    pub(crate) feedback: Option<&'a str>,
    pub(crate) graded_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn record_manual_grade(
    pool: &PgPool,
    id: &str,
    params: ManualGrade<'_>,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $2,
             grade = $3,
             score = $4,
             feedback = COALESCE($5, feedback),
             graded_by = $6,
             graded_at = $7,
             updated_at = $7
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(SubmissionStatus::Graded)
    .bind(params.grade)
    .bind(params.score)
    .bind(params.feedback)
    .bind(params.graded_by)
    .bind(params.now)
    .fetch_optional(pool)
    .await
}

#[derive(Debug, sqlx::FromRow)]
struct GradingRow {
    id: String,
    assignment_id: String,
    student_id: String,
    content: String,
    status: SubmissionStatus,
    title: String,
    subject: String,
    expected_answer: Option<String>,
    key_points: Json<Vec<String>>,
    max_points: i32,
    class_label: Option<String>,
}

#[async_trait]
impl SubmissionStore for PgPool {
    async fn load_for_grading(&self, submission_id: &str) -> Result<GradingSubject, StoreError> {
        let row = sqlx::query_as::<_, GradingRow>(
            "SELECT s.id,
                    s.assignment_id,
                    s.student_id,
                    s.content,
                    s.status,
                    a.title,
                    a.subject,
                    a.expected_answer,
                    a.key_points,
                    a.max_points,
                    a.class_label
             FROM submissions s
             JOIN assignments a ON a.id = s.assignment_id
             WHERE s.id = $1",
        )
        .bind(submission_id)
        .fetch_optional(self)
        .await?
        .ok_or(StoreError::NotFound("submission"))?;

        Ok(GradingSubject {
            submission_id: row.id,
            assignment_id: row.assignment_id,
            student_id: row.student_id,
            content: row.content,
            status: row.status,
            assignment: AssignmentContext {
                title: row.title,
                subject: row.subject,
                expected_answer: row.expected_answer,
                key_points: row.key_points.0,
                max_points: u32::try_from(row.max_points).unwrap_or(0),
                class_label: row.class_label,
            },
        })
    }

    async fn record_ai_grade(
        &self,
        submission_id: &str,
        outcome: &GradingOutcome,
    ) -> Result<(), StoreError> {
        let ai_grading = serde_json::to_value(&outcome.ai_grading)
            .map_err(|err| StoreError::Conflict(format!("unserializable grading: {err}")))?;
        let failure_flags: Vec<String> =
            GRADING_FAILURE_FLAGS.iter().map(|flag| flag.to_string()).collect();

        let result = sqlx::query(
            "UPDATE submissions
             SET status = $2,
                 grade = $3,
                 score = $4,
                 max_points = $5,
                 feedback = $6,
                 ai_grading = $7,
                 flag_reasons = COALESCE(
                     (SELECT jsonb_agg(flag)
                      FROM jsonb_array_elements_text(flag_reasons) AS flag
                      WHERE flag <> ALL($8)),
                     '[]'::jsonb
                 ),
                 graded_by = NULL,
                 graded_at = $9,
                 updated_at = $9
             WHERE id = $1",
        )
        .bind(submission_id)
        .bind(SubmissionStatus::AiGraded)
        .bind(outcome.grade.as_str())
        .bind(i32::try_from(outcome.score).unwrap_or(i32::MAX))
        .bind(i32::try_from(outcome.max_points).unwrap_or(i32::MAX))
        .bind(&outcome.feedback)
        .bind(Json(ai_grading))
        .bind(&failure_flags)
        .bind(primitive_now_utc())
        .execute(self)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("submission"));
        }
        Ok(())
    }

    async fn record_grading_failure(
        &self,
        submission_id: &str,
        error: &str,
        flag_reason: &str,
    ) -> Result<(), StoreError> {
        let ai_grading = serde_json::json!({ "isGraded": false, "error": error });

        let result = sqlx::query(
            "UPDATE submissions
             SET ai_grading = CASE
                     WHEN status IN ('graded', 'ai_graded') THEN ai_grading
                     ELSE $2
                 END,
                 flag_reasons = CASE
                     WHEN flag_reasons ? $3 THEN flag_reasons
                     ELSE flag_reasons || jsonb_build_array($3::text)
                 END,
                 updated_at = $4
             WHERE id = $1",
        )
        .bind(submission_id)
        .bind(Json(ai_grading))
        .bind(flag_reason)
        .bind(primitive_now_utc())
        .execute(self)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("submission"));
        }
        Ok(())
    }
}
