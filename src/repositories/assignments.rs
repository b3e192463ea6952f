use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Assignment;

const COLUMNS: &str = "\
    id, title, subject, description, expected_answer, key_points, max_points, class_label, \
    due_at, created_by, created_at, updated_at";

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) subject: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) expected_answer: Option<&'a str>,
    pub(crate) key_points: &'a [String],
    pub(crate) max_points: i32,
    pub(crate) class_label: Option<&'a str>,
    pub(crate) due_at: Option<PrimitiveDateTime>,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateAssignment<'_>,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "INSERT INTO assignments (
            id, title, subject, description, expected_answer, key_points, max_points,
            class_label, due_at, created_by, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.subject)
    .bind(params.description)
    .bind(params.expected_answer)
    .bind(Json(params.key_points))
    .bind(params.max_points)
    .bind(params.class_label)
    .bind(params.due_at)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
