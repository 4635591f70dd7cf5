//! Production tiers: cost curve, aggregate rate, tick generation, milestones.

use crate::config::{EngineConfig, TierConfig};
use crate::error::Rejection;
use crate::prestige::Perks;
use crate::state::{Currency, GameState};
use crate::upgrades::RunBonuses;

/// Key of the "units of anything" milestone.
pub const GLOBAL_MILESTONE: &str = "any";

/// Cost of the single unit bought when `owned` are already held.
pub fn unit_cost(tier: &TierConfig, growth: f64, owned: u64, discount: f64) -> u64 {
    let exponent = owned.min(i32::MAX as u64) as i32;
    (tier.base_cost * growth.powi(exponent) * (1.0 - discount)).floor() as u64
}

/// Cost of `count` units starting from `owned`: the sum of each unit's cost.
pub fn purchase_cost(tier: &TierConfig, growth: f64, owned: u32, count: u32, discount: f64) -> u64 {
    (0..count as u64).fold(0u64, |total, i| {
        total.saturating_add(unit_cost(tier, growth, owned as u64 + i, discount))
    })
}

/// EU per second from owned units alone.
pub fn base_rate(config: &EngineConfig, state: &GameState) -> f64 {
    config
        .production
        .tiers
        .iter()
        .map(|t| state.owned(&t.id) as f64 * t.base_rate)
        .sum()
}

/// EU per second after run upgrades, timed buffs, the permanent multiplier
/// and the flat starting rate.
pub fn aggregate_rate(config: &EngineConfig, state: &GameState, now_ms: u64) -> f64 {
    let bonuses = RunBonuses::from_state(&config.upgrades, state);
    let perks = Perks::from_state(&config.permanent_upgrades, state);
    base_rate(config, state)
        * bonuses.rate_multiplier
        * state.rate_multiplier(now_ms)
        * state.permanent_multiplier
        + perks.starting_rate
}

/// One production step covering `elapsed_ms` at `rate` EU per second.
/// Returns whole EU credited.
pub fn tick(state: &mut GameState, rate: f64, elapsed_ms: u64) -> u64 {
    if rate <= 0.0 || elapsed_ms == 0 {
        return 0;
    }
    state.carry += rate * elapsed_ms as f64 / 1_000.0;
    // Absorb float drift so ten 0.1 steps make exactly one unit.
    let whole = (state.carry + 1e-9).floor();
    state.carry = (state.carry - whole).max(0.0);
    let whole = whole as u64;
    if whole > 0 {
        state.credit(Currency::Eu, whole);
    }
    whole
}

#[derive(Clone, Debug, PartialEq)]
pub struct Milestone {
    /// `None` for the global milestone.
    pub tier: Option<String>,
    pub threshold: u64,
    pub headline: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Purchase {
    pub tier: String,
    pub bought: u32,
    pub owned: u32,
    pub cost: u64,
    pub milestones: Vec<Milestone>,
}

/// Buy `count` units of a tier with EU.
pub fn buy(
    config: &EngineConfig,
    state: &mut GameState,
    tier_id: &str,
    count: u32,
) -> Result<Purchase, Rejection> {
    if count == 0 {
        return Err(Rejection::ZeroAmount);
    }
    let tier = config
        .tier(tier_id)
        .ok_or_else(|| Rejection::UnknownId(tier_id.to_string()))?;
    let perks = Perks::from_state(&config.permanent_upgrades, state);
    let owned = state.owned(tier_id);
    let cost = purchase_cost(
        tier,
        config.production.cost_growth,
        owned,
        count,
        perks.cost_discount,
    );
    if !state.debit(Currency::Eu, cost) {
        return Err(Rejection::InsufficientFunds {
            currency: Currency::Eu,
            needed: cost,
            available: state.eu,
        });
    }

    let total_before = state.total_units();
    let now_owned = owned.saturating_add(count);
    state.buildings.insert(tier_id.to_string(), now_owned);
    let milestones = record_milestones(config, state, tier, owned, now_owned, total_before);

    Ok(Purchase {
        tier: tier_id.to_string(),
        bought: count,
        owned: now_owned,
        cost,
        milestones,
    })
}

/// Fire every not-yet-fired threshold crossed by this purchase.
fn record_milestones(
    config: &EngineConfig,
    state: &mut GameState,
    tier: &TierConfig,
    before: u32,
    after: u32,
    total_before: u64,
) -> Vec<Milestone> {
    let mut fired = Vec::new();
    for &threshold in &tier.milestones {
        let key = format!("{}:{}", tier.id, threshold);
        if before < threshold && threshold <= after && state.milestones.insert(key) {
            fired.push(Milestone {
                tier: Some(tier.id.clone()),
                threshold: threshold as u64,
                headline: format!("{} now employs {} units", tier.name, threshold),
            });
        }
    }

    let global = config.production.global_milestone;
    let total_after = state.total_units();
    let key = format!("{GLOBAL_MILESTONE}:{global}");
    if global > 0
        && total_before < global
        && global <= total_after
        && state.milestones.insert(key)
    {
        fired.push(Milestone {
            tier: None,
            threshold: global,
            headline: format!("{} production units across the realm", global),
        });
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intern(config: &EngineConfig) -> &TierConfig {
        config.tier("intern").unwrap()
    }

    #[test]
    fn cost_curve_scenario() {
        let config = EngineConfig::default();
        let t = intern(&config);
        assert_eq!(purchase_cost(t, 1.15, 0, 1, 0.0), 15);
        assert_eq!(purchase_cost(t, 1.15, 1, 1, 0.0), 17);
        assert_eq!(purchase_cost(t, 1.15, 0, 2, 0.0), 32);
    }

    #[test]
    fn buy_deducts_and_counts() {
        let config = EngineConfig::default();
        let mut state = GameState::new();
        state.credit(Currency::Eu, 40);
        let p = buy(&config, &mut state, "intern", 2).unwrap();
        assert_eq!(p.cost, 32);
        assert_eq!(p.owned, 2);
        assert_eq!(state.eu, 8);
        assert_eq!(state.owned("intern"), 2);
    }

    #[test]
    fn buy_insufficient_funds_changes_nothing() {
        let config = EngineConfig::default();
        let mut state = GameState::new();
        state.credit(Currency::Eu, 31);
        let err = buy(&config, &mut state, "intern", 2).unwrap_err();
        assert!(matches!(err, Rejection::InsufficientFunds { needed: 32, .. }));
        assert_eq!(state.eu, 31);
        assert_eq!(state.owned("intern"), 0);
    }

    #[test]
    fn discount_lowers_cost() {
        let config = EngineConfig::default();
        let mut state = GameState::new();
        state.permanent_upgrades.insert("bulk_procurement".into(), 5);
        state.credit(Currency::Eu, 100);
        let p = buy(&config, &mut state, "clerk", 1).unwrap();
        assert_eq!(p.cost, 90);
    }

    #[test]
    fn tick_carries_fraction() {
        let mut state = GameState::new();
        let mut produced = 0;
        for _ in 0..10 {
            produced += tick(&mut state, 0.1, 1_000);
        }
        assert_eq!(produced, 1);
        assert_eq!(state.lifetime_eu, 1);
    }

    #[test]
    fn half_second_steps_produce_half_rate() {
        let mut state = GameState::new();
        let mut produced = 0;
        for _ in 0..20 {
            produced += tick(&mut state, 1.0, 500);
        }
        assert_eq!(produced, 10);
        assert_eq!(state.eu, 10);
    }

    #[test]
    fn tick_zero_does_nothing() {
        let mut state = GameState::new();
        assert_eq!(tick(&mut state, 0.0, 1_000), 0);
        assert_eq!(state.eu, 0);
    }

    #[test]
    fn aggregate_rate_stacks_multipliers() {
        let config = EngineConfig::default();
        let mut state = GameState::new();
        state.buildings.insert("clerk".into(), 4);
        state.upgrades.insert("double_entry".into(), 1);
        state.permanent_multiplier = 2.0;
        assert!((aggregate_rate(&config, &state, 0) - 12.0).abs() < 1e-9);

        state.permanent_upgrades.insert("standing_orders".into(), 1);
        assert!((aggregate_rate(&config, &state, 0) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn milestones_fire_once() {
        let config = EngineConfig::default();
        let mut state = GameState::new();
        state.credit(Currency::Eu, 1_000_000);
        let p = buy(&config, &mut state, "intern", 10).unwrap();
        let thresholds: Vec<u64> = p.milestones.iter().map(|m| m.threshold).collect();
        assert_eq!(thresholds, vec![1, 10]);

        let p = buy(&config, &mut state, "intern", 1).unwrap();
        assert!(p.milestones.is_empty());
    }

    #[test]
    fn global_milestone_counts_every_tier() {
        let config = EngineConfig::default();
        let mut state = GameState::new();
        state.buildings.insert("intern".into(), 60);
        state.buildings.insert("clerk".into(), 39);
        state.credit(Currency::Eu, 1_000_000_000);
        let p = buy(&config, &mut state, "office", 1).unwrap();
        assert!(p
            .milestones
            .iter()
            .any(|m| m.tier.is_none() && m.threshold == 100));
    }
}
