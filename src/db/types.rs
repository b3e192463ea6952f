use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub(crate) fn is_staff(self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "submissionstatus", rename_all = "snake_case")]
pub(crate) enum SubmissionStatus {
    Submitted,
    Late,
    Graded,
    AiGraded,
}

impl SubmissionStatus {
    /// Graded rows only change through an explicit re-grade.
    pub(crate) fn is_graded(self) -> bool {
        matches!(self, Self::Graded | Self::AiGraded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "activitykind", rename_all = "lowercase")]
pub(crate) enum ActivityKind {
    Assignment,
    Quiz,
    Video,
    Game,
}

impl ActivityKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Quiz => "quiz",
            Self::Video => "video",
            Self::Game => "game",
        }
    }
}
