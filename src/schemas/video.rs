use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VideoGenerateRequest {
    #[serde(alias = "lessonTitle")]
    #[validate(length(min = 1, max = 200, message = "lesson_title must be 1-200 characters"))]
    pub(crate) lesson_title: String,
    #[validate(length(min = 1, max = 4000, message = "prompt must be 1-4000 characters"))]
    pub(crate) prompt: String,
}
