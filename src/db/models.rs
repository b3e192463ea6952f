use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionStatus;
use crate::services::progression::{EarnedBadge, Redemption};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) description: Option<String>,
    pub(crate) expected_answer: Option<String>,
    pub(crate) key_points: Json<Vec<String>>,
    pub(crate) max_points: i32,
    pub(crate) class_label: Option<String>,
    pub(crate) due_at: Option<PrimitiveDateTime>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) student_id: String,
    pub(crate) content: String,
    pub(crate) attachments: Json<Vec<String>>,
    pub(crate) content_hash: String,
    pub(crate) status: SubmissionStatus,
    pub(crate) grade: Option<String>,
    pub(crate) score: Option<i32>,
    pub(crate) max_points: i32,
    pub(crate) feedback: Option<String>,
    pub(crate) ai_grading: Option<Json<serde_json::Value>>,
    pub(crate) flag_reasons: Json<Vec<String>>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) graded_by: Option<String>,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct StudentProgressionRow {
    pub(crate) id: String,
    pub(crate) current_xp: i64,
    pub(crate) level: i32,
    pub(crate) next_level_xp: i64,
    pub(crate) badges: Json<Vec<EarnedBadge>>,
    pub(crate) eco_points: i64,
    pub(crate) game_points: i64,
    pub(crate) coins: i64,
    pub(crate) redemptions: Json<Vec<Redemption>>,
    pub(crate) progression_version: i64,
}
