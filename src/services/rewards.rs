//! Activity rewards and coin redemption on top of the progression calculator.
//!
//! Every award is keyed by (student, activity kind, source id) in a ledger so
//! replays are no-ops. State changes are committed with an optimistic version
//! check and retried when another request got there first.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::types::ActivityKind;
use crate::services::progression::{apply_xp, EarnedBadge, ProgressionState, Redemption};
use crate::services::StoreError;

const MAX_COMMIT_ATTEMPTS: u32 = 5;

const VIDEO_XP: u64 = 20;
const VIDEO_COINS: u64 = 2;
const QUIZ_XP_PER_CORRECT: u64 = 10;
const GAME_XP_DIVISOR: u64 = 10;
const GAME_COINS: u64 = 1;
const ASSIGNMENT_COIN_DIVISOR: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Wallet {
    pub(crate) eco_points: u64,
    pub(crate) game_points: u64,
    pub(crate) coins: u64,
    pub(crate) redemptions: Vec<Redemption>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StudentProgression {
    pub(crate) student_id: String,
    pub(crate) progression: ProgressionState,
    pub(crate) wallet: Wallet,
    pub(crate) version: i64,
}

/// A completed activity. `amount` is the assignment score, the number of
/// correct quiz answers, or the game score; videos ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AwardEvent {
    pub(crate) kind: ActivityKind,
    pub(crate) source_id: String,
    pub(crate) amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ActivityReward {
    pub(crate) xp: u64,
    pub(crate) coins: u64,
    pub(crate) eco_points: u64,
    pub(crate) game_points: u64,
}

pub(crate) fn reward_for(event: &AwardEvent) -> ActivityReward {
    let amount = event.amount;
    match event.kind {
        ActivityKind::Assignment => ActivityReward {
            xp: amount,
            coins: amount / ASSIGNMENT_COIN_DIVISOR,
            eco_points: amount,
            game_points: 0,
        },
        ActivityKind::Quiz => ActivityReward {
            xp: amount.saturating_mul(QUIZ_XP_PER_CORRECT),
            coins: amount,
            ..ActivityReward::default()
        },
        ActivityKind::Video => {
            ActivityReward { xp: VIDEO_XP, coins: VIDEO_COINS, ..ActivityReward::default() }
        }
        ActivityKind::Game => ActivityReward {
            xp: amount / GAME_XP_DIVISOR,
            coins: GAME_COINS,
            eco_points: 0,
            game_points: amount,
        },
    }
}

/// Ledger row written alongside the state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AwardRecord {
    pub(crate) kind: ActivityKind,
    pub(crate) source_id: String,
    pub(crate) xp: u64,
    pub(crate) coins: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommitOutcome {
    Applied,
    AlreadyAwarded,
    VersionConflict,
}

#[async_trait]
pub(crate) trait ProgressionStore: Send + Sync {
    /// Loads the student's progression, creating a fresh record if needed.
    async fn load(&self, student_id: &str) -> Result<StudentProgression, StoreError>;

    /// Writes `next` and the ledger row if the stored version still equals
    /// `expected_version` and the event has not been rewarded before.
    async fn commit_award(
        &self,
        expected_version: i64,
        next: &StudentProgression,
        award: &AwardRecord,
    ) -> Result<CommitOutcome, StoreError>;

    /// Writes the wallet of `next` if the stored version is unchanged.
    async fn commit_wallet(
        &self,
        expected_version: i64,
        next: &StudentProgression,
    ) -> Result<CommitOutcome, StoreError>;
}

#[derive(Debug, Error)]
pub(crate) enum RewardError {
    #[error("not enough coins: {balance} available, {cost} required")]
    InsufficientCoins { balance: u64, cost: u64 },
    #[error("progression was updated concurrently too many times")]
    Contention,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AwardSummary {
    pub(crate) already_awarded: bool,
    pub(crate) xp_awarded: u64,
    pub(crate) coins_awarded: u64,
    pub(crate) levels_gained: u32,
    pub(crate) newly_earned_badges: Vec<EarnedBadge>,
    #[serde(flatten)]
    pub(crate) progression: ProgressionState,
    pub(crate) wallet: Wallet,
}

pub(crate) async fn award_activity(
    store: &dyn ProgressionStore,
    student_id: &str,
    event: &AwardEvent,
) -> Result<AwardSummary, RewardError> {
    let reward = reward_for(event);
    let record = AwardRecord {
        kind: event.kind,
        source_id: event.source_id.clone(),
        xp: reward.xp,
        coins: reward.coins,
    };

    for attempt in 0..MAX_COMMIT_ATTEMPTS {
        let current = store.load(student_id).await?;
        let update = apply_xp(current.progression.clone(), reward.xp, OffsetDateTime::now_utc());

        let mut next = current.clone();
        next.progression = update.state.clone();
        next.wallet.coins = next.wallet.coins.saturating_add(reward.coins);
        next.wallet.eco_points = next.wallet.eco_points.saturating_add(reward.eco_points);
        next.wallet.game_points = next.wallet.game_points.saturating_add(reward.game_points);
        next.version = current.version + 1;

        match store.commit_award(current.version, &next, &record).await? {
            CommitOutcome::Applied => {
                if update.levels_gained > 0 {
                    metrics::counter!("progression_level_ups_total")
                        .increment(u64::from(update.levels_gained));
                }
                if !update.newly_earned_badges.is_empty() {
                    metrics::counter!("badges_awarded_total")
                        .increment(update.newly_earned_badges.len() as u64);
                }
                tracing::info!(
                    student_id,
                    kind = event.kind.as_str(),
                    source_id = %event.source_id,
                    xp = reward.xp,
                    coins = reward.coins,
                    level = next.progression.level,
                    "Activity rewarded"
                );
                return Ok(AwardSummary {
                    already_awarded: false,
                    xp_awarded: reward.xp,
                    coins_awarded: reward.coins,
                    levels_gained: update.levels_gained,
                    newly_earned_badges: update.newly_earned_badges,
                    progression: next.progression,
                    wallet: next.wallet,
                });
            }
            CommitOutcome::AlreadyAwarded => {
                tracing::debug!(
                    student_id,
                    kind = event.kind.as_str(),
                    source_id = %event.source_id,
                    "Activity already rewarded"
                );
                return Ok(AwardSummary {
                    already_awarded: true,
                    xp_awarded: 0,
                    coins_awarded: 0,
                    levels_gained: 0,
                    newly_earned_badges: Vec::new(),
                    progression: current.progression,
                    wallet: current.wallet,
                });
            }
            CommitOutcome::VersionConflict => {
                tracing::debug!(student_id, attempt, "Progression version conflict; retrying");
            }
        }
    }

    Err(RewardError::Contention)
}

pub(crate) async fn redeem(
    store: &dyn ProgressionStore,
    student_id: &str,
    reward: &str,
    cost: u64,
) -> Result<(Redemption, Wallet), RewardError> {
    for attempt in 0..MAX_COMMIT_ATTEMPTS {
        let current = store.load(student_id).await?;
        if current.wallet.coins < cost {
            return Err(RewardError::InsufficientCoins { balance: current.wallet.coins, cost });
        }

        let redemption = Redemption {
            id: Uuid::new_v4().to_string(),
            reward: reward.to_string(),
            cost,
            redeemed_at: OffsetDateTime::now_utc(),
        };
        let mut next = current.clone();
        next.wallet.coins -= cost;
        next.wallet.redemptions.push(redemption.clone());
        next.version = current.version + 1;

        match store.commit_wallet(current.version, &next).await? {
            CommitOutcome::Applied => {
                tracing::info!(student_id, reward, cost, "Coins redeemed");
                return Ok((redemption, next.wallet));
            }
            CommitOutcome::AlreadyAwarded | CommitOutcome::VersionConflict => {
                tracing::debug!(student_id, attempt, "Wallet version conflict; retrying");
            }
        }
    }

    Err(RewardError::Contention)
}
