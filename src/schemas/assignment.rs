use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Assignment;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AssignmentCreate {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub(crate) title: String,
    #[validate(length(min = 1, max = 100, message = "subject must be 1-100 characters"))]
    pub(crate) subject: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default, alias = "expectedAnswer")]
    pub(crate) expected_answer: Option<String>,
    #[serde(default, alias = "keyPoints")]
    #[validate(length(max = 50, message = "at most 50 key points are allowed"))]
    pub(crate) key_points: Vec<String>,
    #[serde(alias = "maxPoints")]
    #[validate(range(min = 1, max = 1000, message = "max_points must be between 1 and 1000"))]
    pub(crate) max_points: i32,
    #[serde(default, alias = "classLabel")]
    pub(crate) class_label: Option<String>,
    #[serde(default, alias = "dueAt", with = "time::serde::rfc3339::option")]
    pub(crate) due_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) description: Option<String>,
    pub(crate) key_points: Vec<String>,
    pub(crate) max_points: i32,
    pub(crate) class_label: Option<String>,
    pub(crate) due_at: Option<String>,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
}

impl From<Assignment> for AssignmentResponse {
    fn from(assignment: Assignment) -> Self {
        Self {
            id: assignment.id,
            title: assignment.title,
            subject: assignment.subject,
            description: assignment.description,
            key_points: assignment.key_points.0,
            max_points: assignment.max_points,
            class_label: assignment.class_label,
            due_at: format_optional(assignment.due_at),
            created_by: assignment.created_by,
            created_at: format_primitive(assignment.created_at),
        }
    }
}
