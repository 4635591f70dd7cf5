//! Prestige: protocol-point math, ascension reset, permanent upgrades.
//!
//! Everything here is profile-scoped. Other modules read it only through
//! [`Perks`] and `GameState::permanent_multiplier`.

use tracing::info;

use crate::config::{EngineConfig, PermanentEffect, PermanentUpgradeConfig, PrestigeConfig};
use crate::error::Rejection;
use crate::state::{Currency, GameState};

/// Summed effect of every owned permanent upgrade.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Perks {
    pub click_bonus: f64,
    pub cost_discount: f64,
    pub phase_shield: f64,
    pub conversion_discount: f64,
    pub temporal_levels: u32,
    pub carry_over: u32,
    pub starting_capital: u64,
    pub starting_rate: f64,
}

impl Perks {
    pub fn from_state(upgrades: &[PermanentUpgradeConfig], state: &GameState) -> Self {
        let mut perks = Perks::default();
        for up in upgrades {
            let level = state.permanent_level(&up.id);
            if level == 0 {
                continue;
            }
            let lf = level as f64;
            match &up.effect {
                PermanentEffect::ClickBonus(v) => perks.click_bonus += v * lf,
                PermanentEffect::CostDiscount(v) => perks.cost_discount += v * lf,
                PermanentEffect::PhaseShield(v) => perks.phase_shield += v * lf,
                PermanentEffect::ConversionDiscount(v) => perks.conversion_discount += v * lf,
                PermanentEffect::Temporal => perks.temporal_levels += level,
                PermanentEffect::CarryOver(n) => perks.carry_over += n * level,
                PermanentEffect::StartingCapital(n) => {
                    perks.starting_capital += n.saturating_mul(level as u64)
                }
                PermanentEffect::StartingRate(v) => perks.starting_rate += v * lf,
            }
        }
        // A discount can never make units free.
        perks.cost_discount = perks.cost_discount.clamp(0.0, 0.9);
        perks
    }
}

/// `floor(sqrt(lifetime_eu / divisor))`.
pub fn potential_points(config: &PrestigeConfig, lifetime_eu: u64) -> u64 {
    if config.points_divisor <= 0.0 {
        return 0;
    }
    (lifetime_eu as f64 / config.points_divisor).sqrt().floor() as u64
}

/// Points an ascension right now would bank.
pub fn new_points(config: &PrestigeConfig, state: &GameState) -> u64 {
    potential_points(config, state.lifetime_eu).saturating_sub(state.banked_points)
}

/// `(1 + banked * point_bonus) * (1 + temporal * temporal_bonus)`.
pub fn permanent_multiplier(config: &PrestigeConfig, banked: u64, temporal_levels: u32) -> f64 {
    (1.0 + banked as f64 * config.point_bonus)
        * (1.0 + temporal_levels as f64 * config.temporal_bonus)
}

/// Raise the stored multiplier to match banked points and perks. Never lowers it.
pub fn refresh_multiplier(config: &EngineConfig, state: &mut GameState) -> f64 {
    let perks = Perks::from_state(&config.permanent_upgrades, state);
    let computed = permanent_multiplier(&config.prestige, state.banked_points, perks.temporal_levels);
    state.permanent_multiplier = state.permanent_multiplier.max(computed);
    state.permanent_multiplier
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ascension {
    pub count: u32,
    pub points_earned: u64,
    pub total_points: u64,
    pub multiplier: f64,
    pub starting_capital: u64,
}

/// Bank points and reset the run.
///
/// Lifetime counters, permanent upgrades, the crown seed and pending escrow
/// holds survive. Everything run-scoped goes back to its default.
pub fn ascend(config: &EngineConfig, state: &mut GameState) -> Result<Ascension, Rejection> {
    let potential = potential_points(&config.prestige, state.lifetime_eu);
    let earned = potential.saturating_sub(state.banked_points);
    if earned == 0 {
        return Err(Rejection::NothingToBank {
            potential,
            banked: state.banked_points,
        });
    }

    state.banked_points += earned;
    state.protocol_points += earned;
    state.ascensions += 1;

    let perks = Perks::from_state(&config.permanent_upgrades, state);
    reset_run(state, perks.carry_over);
    let multiplier = refresh_multiplier(config, state);
    state.grant(Currency::Eu, perks.starting_capital);

    info!(
        ascensions = state.ascensions,
        earned,
        banked = state.banked_points,
        multiplier,
        "ascended"
    );

    Ok(Ascension {
        count: state.ascensions,
        points_earned: earned,
        total_points: state.banked_points,
        multiplier,
        starting_capital: perks.starting_capital,
    })
}

fn reset_run(state: &mut GameState, carry_over: u32) {
    for currency in Currency::chain() {
        let balance = state.balance(*currency);
        state.drain(*currency, balance);
    }
    state.buildings = std::mem::take(&mut state.buildings)
        .into_iter()
        .map(|(id, owned)| (id, owned.min(carry_over)))
        .filter(|(_, kept)| *kept > 0)
        .collect();
    state.upgrades.clear();
    state.phase = 1;
    state.total_clicks = 0;
    state.session_clicks = 0;
    state.click_times.clear();
    state.collectibles = 0;
    state.milestones.clear();
    state.carry = 0.0;
    state.buffs.clear();
    state.award = None;
    state.next_award_ms = None;
}

/// Linear cost: `base_cost * (level + 1)`.
pub fn permanent_cost(up: &PermanentUpgradeConfig, level: u32) -> u64 {
    up.base_cost.saturating_mul(level as u64 + 1)
}

#[derive(Clone, Debug, PartialEq)]
pub struct PermanentPurchase {
    pub id: String,
    pub level: u32,
    pub cost: u64,
}

/// Buy one level of a permanent upgrade with protocol points.
pub fn buy_permanent(
    config: &EngineConfig,
    state: &mut GameState,
    id: &str,
) -> Result<PermanentPurchase, Rejection> {
    let up = config
        .permanent_upgrade(id)
        .ok_or_else(|| Rejection::UnknownId(id.to_string()))?;
    let level = state.permanent_level(id);
    if level >= up.max_level {
        return Err(Rejection::MaxLevel {
            id: id.to_string(),
            max_level: up.max_level,
        });
    }
    let cost = permanent_cost(up, level);
    if !state.debit(Currency::Pp, cost) {
        return Err(Rejection::InsufficientFunds {
            currency: Currency::Pp,
            needed: cost,
            available: state.protocol_points,
        });
    }
    state.permanent_upgrades.insert(id.to_string(), level + 1);
    refresh_multiplier(config, state);

    Ok(PermanentPurchase {
        id: id.to_string(),
        level: level + 1,
        cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn four_million_is_two_points() {
        assert_eq!(potential_points(&PrestigeConfig::default(), 4_000_000), 2);
        assert_eq!(potential_points(&PrestigeConfig::default(), 3_999_999), 1);
        assert_eq!(potential_points(&PrestigeConfig::default(), 999_999), 0);
    }

    #[test]
    fn new_points_subtract_banked() {
        let mut state = GameState::new();
        state.lifetime_eu = 9_000_000;
        state.banked_points = 2;
        assert_eq!(new_points(&PrestigeConfig::default(), &state), 1);
        state.banked_points = 5;
        assert_eq!(new_points(&PrestigeConfig::default(), &state), 0);
    }

    #[test]
    fn ascend_requires_new_points() {
        let mut state = GameState::new();
        state.lifetime_eu = 500_000;
        let err = ascend(&config(), &mut state).unwrap_err();
        assert!(matches!(err, Rejection::NothingToBank { .. }));
        assert_eq!(state.ascensions, 0);
    }

    #[test]
    fn ascend_resets_run_and_banks() {
        let mut state = GameState::new();
        state.credit(Currency::Eu, 4_000_000);
        state.credit(Currency::Cc, 30);
        state.total_clicks = 700;
        state.phase = 4;
        state.buildings.insert("intern".into(), 12);
        state.upgrades.insert("double_entry".into(), 1);
        state.collectibles = 3;
        state.milestones.insert("intern:10".into());
        state.escrow.push(crate::state::EscrowHold {
            amount: 5,
            release_at_ms: 99_000,
        });

        let result = ascend(&config(), &mut state).unwrap();

        assert_eq!(result.points_earned, 2);
        assert_eq!(result.total_points, 2);
        assert_eq!(state.protocol_points, 2);
        assert_eq!(state.eu, 0);
        assert_eq!(state.cc, 0);
        assert_eq!(state.lifetime_eu, 4_000_000);
        assert_eq!(state.total_clicks, 0);
        assert_eq!(state.phase, 1);
        assert!(state.buildings.is_empty());
        assert!(state.upgrades.is_empty());
        assert!(state.milestones.is_empty());
        assert_eq!(state.collectibles, 0);
        assert_eq!(state.escrow.len(), 1);
        assert!((state.permanent_multiplier - 1.02).abs() < 1e-9);
    }

    #[test]
    fn carry_over_keeps_some_units() {
        let mut state = GameState::new();
        state.credit(Currency::Eu, 1_000_000);
        state.buildings.insert("intern".into(), 12);
        state.buildings.insert("clerk".into(), 1);
        state.permanent_upgrades.insert("succession_plan".into(), 2);

        ascend(&config(), &mut state).unwrap();

        assert_eq!(state.owned("intern"), 2);
        assert_eq!(state.owned("clerk"), 1);
    }

    #[test]
    fn starting_capital_skips_lifetime() {
        let mut state = GameState::new();
        state.credit(Currency::Eu, 1_000_000);
        state.permanent_upgrades.insert("seed_funding".into(), 3);

        let result = ascend(&config(), &mut state).unwrap();

        assert_eq!(result.starting_capital, 3_000);
        assert_eq!(state.eu, 3_000);
        assert_eq!(state.lifetime_eu, 1_000_000);
    }

    #[test]
    fn permanent_cost_is_linear() {
        let cfg = config();
        let up = cfg.permanent_upgrade("red_tape").unwrap();
        assert_eq!(permanent_cost(up, 0), 3);
        assert_eq!(permanent_cost(up, 1), 6);
        assert_eq!(permanent_cost(up, 4), 15);
    }

    #[test]
    fn buy_permanent_spends_points() {
        let cfg = config();
        let mut state = GameState::new();
        state.protocol_points = 3;

        let bought = buy_permanent(&cfg, &mut state, "firm_handshake").unwrap();
        assert_eq!(bought.level, 1);
        assert_eq!(bought.cost, 1);
        let bought = buy_permanent(&cfg, &mut state, "firm_handshake").unwrap();
        assert_eq!(bought.cost, 2);
        assert_eq!(state.protocol_points, 0);

        let err = buy_permanent(&cfg, &mut state, "firm_handshake").unwrap_err();
        assert!(matches!(err, Rejection::InsufficientFunds { .. }));
        assert_eq!(state.permanent_level("firm_handshake"), 2);
    }

    #[test]
    fn maxed_permanent_is_rejected() {
        let cfg = config();
        let mut state = GameState::new();
        state.protocol_points = 1_000;
        state.permanent_upgrades.insert("insider_rates".into(), 3);
        let err = buy_permanent(&cfg, &mut state, "insider_rates").unwrap_err();
        assert!(matches!(err, Rejection::MaxLevel { max_level: 3, .. }));
        assert_eq!(state.protocol_points, 1_000);
    }

    #[test]
    fn temporal_purchase_raises_multiplier() {
        let cfg = config();
        let mut state = GameState::new();
        state.protocol_points = 5;
        buy_permanent(&cfg, &mut state, "temporal_audit").unwrap();
        assert!((state.permanent_multiplier - 1.10).abs() < 1e-9);
    }

    #[test]
    fn perks_sum_levels() {
        let cfg = config();
        let mut state = GameState::new();
        state.permanent_upgrades.insert("firm_handshake".into(), 3);
        state.permanent_upgrades.insert("bulk_procurement".into(), 2);
        state.permanent_upgrades.insert("standing_orders".into(), 4);
        let perks = Perks::from_state(&cfg.permanent_upgrades, &state);
        assert!((perks.click_bonus - 3.0).abs() < 1e-9);
        assert!((perks.cost_discount - 0.04).abs() < 1e-9);
        assert!((perks.starting_rate - 2.0).abs() < 1e-9);
        assert_eq!(perks.temporal_levels, 0);
    }
}
