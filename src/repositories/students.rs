use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::StudentProgressionRow;
use crate::services::progression::ProgressionState;
use crate::services::rewards::{
    AwardRecord, CommitOutcome, ProgressionStore, StudentProgression, Wallet,
};
use crate::services::StoreError;

const PROGRESSION_COLUMNS: &str = "\
    id, current_xp, level, next_level_xp, badges, eco_points, game_points, coins, \
    redemptions, progression_version";

/// Creates the student's progression record if it does not exist yet.
pub(crate) async fn ensure(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO students (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn find_progression(
    pool: &PgPool,
    id: &str,
) -> Result<Option<StudentProgressionRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentProgressionRow>(&format!(
        "SELECT {PROGRESSION_COLUMNS} FROM students WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl From<StudentProgressionRow> for StudentProgression {
    fn from(row: StudentProgressionRow) -> Self {
        Self {
            student_id: row.id,
            progression: ProgressionState {
                current_xp: to_u64(row.current_xp),
                level: u32::try_from(row.level).unwrap_or(1).max(1),
                next_level_xp: to_u64(row.next_level_xp),
                badges: row.badges.0,
            },
            wallet: Wallet {
                eco_points: to_u64(row.eco_points),
                game_points: to_u64(row.game_points),
                coins: to_u64(row.coins),
                redemptions: row.redemptions.0,
            },
            version: row.progression_version,
        }
    }
}

#[async_trait]
impl ProgressionStore for PgPool {
    async fn load(&self, student_id: &str) -> Result<StudentProgression, StoreError> {
        ensure(self, student_id).await?;
        find_progression(self, student_id)
            .await?
            .map(StudentProgression::from)
            .ok_or(StoreError::NotFound("student"))
    }

    async fn commit_award(
        &self,
        expected_version: i64,
        next: &StudentProgression,
        award: &AwardRecord,
    ) -> Result<CommitOutcome, StoreError> {
        let now = primitive_now_utc();
        let mut tx = self.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO point_awards (id, student_id, source_kind, source_id, xp, coins, awarded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (student_id, source_kind, source_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&next.student_id)
        .bind(award.kind)
        .bind(&award.source_id)
        .bind(to_i64(award.xp))
        .bind(to_i64(award.coins))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::AlreadyAwarded);
        }

        let updated = sqlx::query(
            "UPDATE students
             SET current_xp = $3,
                 level = $4,
                 next_level_xp = $5,
                 badges = $6,
                 eco_points = $7,
                 game_points = $8,
                 coins = $9,
                 progression_version = $10,
                 updated_at = $11
             WHERE id = $1 AND progression_version = $2",
        )
        .bind(&next.student_id)
        .bind(expected_version)
        .bind(to_i64(next.progression.current_xp))
        .bind(i32::try_from(next.progression.level).unwrap_or(i32::MAX))
        .bind(to_i64(next.progression.next_level_xp))
        .bind(Json(&next.progression.badges))
        .bind(to_i64(next.wallet.eco_points))
        .bind(to_i64(next.wallet.game_points))
        .bind(to_i64(next.wallet.coins))
        .bind(next.version)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::VersionConflict);
        }

        tx.commit().await?;
        Ok(CommitOutcome::Applied)
    }

    async fn commit_wallet(
        &self,
        expected_version: i64,
        next: &StudentProgression,
    ) -> Result<CommitOutcome, StoreError> {
        let updated = sqlx::query(
            "UPDATE students
             SET coins = $3,
                 redemptions = $4,
                 progression_version = $5,
                 updated_at = $6
             WHERE id = $1 AND progression_version = $2",
        )
        .bind(&next.student_id)
        .bind(expected_version)
        .bind(to_i64(next.wallet.coins))
        .bind(Json(&next.wallet.redemptions))
        .bind(next.version)
        .bind(primitive_now_utc())
        .execute(self)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(CommitOutcome::VersionConflict);
        }
        Ok(CommitOutcome::Applied)
    }
}
