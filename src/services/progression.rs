//! Level, XP and badge progression.
//!
//! Each level costs `floor(100 * 1.5^(level - 1))` XP. Gains are applied one
//! threshold at a time so a large grant walks every intermediate level and no
//! badge tier is skipped. Thresholds too large for `u64` saturate at
//! `u64::MAX`. The calculator is a pure function of state and gain; replay
//! protection lives in the award ledger (see `services::rewards`).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const BASE_LEVEL_XP: u128 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BadgeDescriptor {
    pub(crate) badge_id: &'static str,
    pub(crate) level: u32,
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) icon: &'static str,
    pub(crate) rarity: Rarity,
}

const fn badge(
    level: u32,
    badge_id: &'static str,
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    rarity: Rarity,
) -> BadgeDescriptor {
    BadgeDescriptor { badge_id, level, name, description, icon, rarity }
}

pub(crate) const BADGE_CATALOG: &[BadgeDescriptor] = &[
    badge(2, "first-steps", "First Steps", "Reached level 2", "🌱", Rarity::Common),
    badge(3, "eager-learner", "Eager Learner", "Reached level 3", "📘", Rarity::Common),
    badge(5, "rising-star", "Rising Star", "Reached level 5", "⭐", Rarity::Uncommon),
    badge(7, "knowledge-seeker", "Knowledge Seeker", "Reached level 7", "🔍", Rarity::Uncommon),
    badge(10, "scholar", "Scholar", "Reached level 10", "🎓", Rarity::Rare),
    badge(15, "mentor", "Mentor", "Reached level 15", "🧭", Rarity::Rare),
    badge(20, "sage", "Sage", "Reached level 20", "🦉", Rarity::Epic),
    badge(25, "trailblazer", "Trailblazer", "Reached level 25", "🔥", Rarity::Epic),
    badge(30, "luminary", "Luminary", "Reached level 30", "💡", Rarity::Legendary),
    badge(50, "grandmaster", "Grandmaster", "Reached level 50", "👑", Rarity::Legendary),
];

pub(crate) fn badge_for_level(level: u32) -> Option<&'static BadgeDescriptor> {
    BADGE_CATALOG.iter().find(|badge| badge.level == level)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EarnedBadge {
    pub(crate) badge_id: String,
    pub(crate) name: String,
    pub(crate) level: u32,
    pub(crate) rarity: Rarity,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) earned_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Redemption {
    pub(crate) id: String,
    pub(crate) reward: String,
    pub(crate) cost: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) redeemed_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProgressionState {
    #[serde(rename = "currentXP")]
    pub(crate) current_xp: u64,
    pub(crate) level: u32,
    #[serde(rename = "nextLevelXP")]
    pub(crate) next_level_xp: u64,
    pub(crate) badges: Vec<EarnedBadge>,
}

impl Default for ProgressionState {
    fn default() -> Self {
        Self { current_xp: 0, level: 1, next_level_xp: xp_threshold(1), badges: Vec::new() }
    }
}

impl ProgressionState {
    pub(crate) fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|badge| badge.badge_id == badge_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressionUpdate {
    #[serde(flatten)]
    pub(crate) state: ProgressionState,
    pub(crate) levels_gained: u32,
    pub(crate) newly_earned_badges: Vec<EarnedBadge>,
}

/// XP needed to advance from `level` to `level + 1`.
///
/// The value is kept exactly as `whole + fraction / 2^step` while multiplying
/// by 3/2, so flooring happens once at the end.
pub(crate) fn xp_threshold(level: u32) -> u64 {
    let exponent = level.max(1) - 1;
    let mut whole = BASE_LEVEL_XP;
    let mut fraction: u128 = 0;

    for step in 0..exponent {
        if whole > u128::from(u64::MAX) {
            return u64::MAX;
        }
        // whole < 2^64 here, so step stays below 100 and nothing overflows.
        let tripled = whole * 3;
        let carried = ((tripled & 1) << step) + fraction * 3;
        whole = tripled / 2 + (carried >> (step + 1));
        fraction = carried & ((1u128 << (step + 1)) - 1);
    }

    u64::try_from(whole).unwrap_or(u64::MAX)
}

/// Adds `gain` XP and walks every level boundary it crosses.
pub(crate) fn apply_xp(
    mut state: ProgressionState,
    gain: u64,
    now: OffsetDateTime,
) -> ProgressionUpdate {
    state.level = state.level.max(1);
    state.current_xp = state.current_xp.saturating_add(gain);
    state.next_level_xp = xp_threshold(state.level);
    let starting_level = state.level;
    let mut newly_earned_badges = Vec::new();

    while state.current_xp >= state.next_level_xp {
        state.current_xp -= state.next_level_xp;
        state.level += 1;
        state.next_level_xp = xp_threshold(state.level);

        let Some(descriptor) = badge_for_level(state.level) else {
            continue;
        };
        if state.has_badge(descriptor.badge_id) {
            continue;
        }

        let earned = EarnedBadge {
            badge_id: descriptor.badge_id.to_string(),
            name: descriptor.name.to_string(),
            level: state.level,
            rarity: descriptor.rarity,
            earned_at: now,
        };
        state.badges.push(earned.clone());
        newly_earned_badges.push(earned);
    }

    let levels_gained = state.level - starting_level;
    ProgressionUpdate { state, levels_gained, newly_earned_badges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-05-01 09:00:00 UTC);

    #[test]
    fn threshold_follows_geometric_curve() {
        assert_eq!(xp_threshold(1), 100);
        assert_eq!(xp_threshold(2), 150);
        assert_eq!(xp_threshold(3), 225);
        assert_eq!(xp_threshold(4), 337);
        assert_eq!(xp_threshold(5), 506);
        assert_eq!(xp_threshold(10), 3844);
        assert_eq!(xp_threshold(0), 100);
        assert_eq!(xp_threshold(500), u64::MAX);
        assert_eq!(xp_threshold(u32::MAX), u64::MAX);
    }

    #[test]
    fn threshold_matches_closed_form_while_it_fits() {
        for level in 1..=77u32 {
            let exponent = level - 1;
            let exact = 100u128 * 3u128.pow(exponent) / 2u128.pow(exponent);
            assert_eq!(u128::from(xp_threshold(level)), exact, "level {level}");
        }
    }

    #[test]
    fn threshold_grows_through_high_levels_then_saturates() {
        let band: Vec<u64> = (76..=82).map(xp_threshold).collect();
        assert!(band.windows(2).all(|pair| pair[0] < pair[1]), "{band:?}");
        assert!(band.iter().all(|value| *value < u64::MAX));

        let finite_levels = (1..200).map(xp_threshold).filter(|value| *value < u64::MAX).count();
        assert!(finite_levels > 90, "saturated after {finite_levels} levels");
        assert_eq!(xp_threshold(120), u64::MAX);
    }

    #[test]
    fn gain_at_high_level_stays_below_threshold() {
        let state = ProgressionState {
            current_xp: 0,
            level: 78,
            next_level_xp: 0,
            badges: vec![],
        };

        let update = apply_xp(state, 1, NOW);

        assert_eq!(update.state.level, 78);
        assert_eq!(update.state.current_xp, 1);
        assert_eq!(update.state.next_level_xp, xp_threshold(78));
        assert!(update.state.current_xp < update.state.next_level_xp);
        assert_eq!(update.levels_gained, 0);
    }

    #[test]
    fn gain_below_threshold_only_adds_xp() {
        let update = apply_xp(ProgressionState::default(), 40, NOW);
        assert_eq!(update.state.level, 1);
        assert_eq!(update.state.current_xp, 40);
        assert_eq!(update.state.next_level_xp, 100);
        assert_eq!(update.levels_gained, 0);
        assert!(update.newly_earned_badges.is_empty());
    }

    #[test]
    fn multi_level_gain_walks_every_threshold() {
        let update = apply_xp(ProgressionState::default(), 250, NOW);

        assert_eq!(update.state.level, 3);
        assert_eq!(update.state.current_xp, 0);
        assert_eq!(update.state.next_level_xp, 225);
        assert_eq!(update.levels_gained, 2);

        let ids: Vec<&str> =
            update.newly_earned_badges.iter().map(|badge| badge.badge_id.as_str()).collect();
        assert_eq!(ids, vec!["first-steps", "eager-learner"]);
        assert_eq!(update.state.badges.len(), 2);
        assert!(update.newly_earned_badges.iter().all(|badge| badge.earned_at == NOW));
    }

    #[test]
    fn large_grant_does_not_skip_badge_tiers() {
        let update = apply_xp(ProgressionState::default(), 10_000, NOW);

        assert!(update.state.level >= 10);
        for tier in [2, 3, 5, 7, 10] {
            let descriptor = badge_for_level(tier).expect("catalog tier");
            assert!(update.state.has_badge(descriptor.badge_id), "missing tier {tier}");
        }
        assert!(update.state.current_xp < update.state.next_level_xp);
    }

    #[test]
    fn held_badge_is_not_duplicated_on_replay() {
        let mut state = ProgressionState::default();
        state.badges.push(EarnedBadge {
            badge_id: "first-steps".to_string(),
            name: "First Steps".to_string(),
            level: 2,
            rarity: Rarity::Common,
            earned_at: datetime!(2024-01-01 00:00:00 UTC),
        });

        let update = apply_xp(state, 100, NOW);

        assert_eq!(update.state.level, 2);
        assert!(update.newly_earned_badges.is_empty());
        assert_eq!(update.state.badges.iter().filter(|b| b.badge_id == "first-steps").count(), 1);
    }

    #[test]
    fn stale_overflow_is_reconciled() {
        let state = ProgressionState { current_xp: 180, level: 1, next_level_xp: 100, badges: vec![] };

        let update = apply_xp(state, 0, NOW);

        assert_eq!(update.state.level, 2);
        assert_eq!(update.state.current_xp, 80);
        assert_eq!(update.state.next_level_xp, 150);
    }

    #[test]
    fn serializes_with_external_field_names() {
        let update = apply_xp(ProgressionState::default(), 100, NOW);
        let json = serde_json::to_value(&update).expect("json");

        assert_eq!(json["currentXP"], 0);
        assert_eq!(json["nextLevelXP"], 150);
        assert_eq!(json["level"], 2);
        assert_eq!(json["newlyEarnedBadges"][0]["badgeId"], "first-steps");
        assert_eq!(json["newlyEarnedBadges"][0]["earnedAt"], "2025-05-01T09:00:00Z");
    }

    #[test]
    fn catalog_levels_are_unique_and_ordered() {
        let levels: Vec<u32> = BADGE_CATALOG.iter().map(|badge| badge.level).collect();
        let mut sorted = levels.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(levels, sorted);
    }
}
