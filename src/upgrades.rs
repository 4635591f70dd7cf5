//! Run upgrades, bought with CC and wiped by ascension.

use crate::config::{EngineConfig, UpgradeConfig, UpgradeEffect};
use crate::error::Rejection;
use crate::state::{Currency, GameState};

/// Combined effect of owned run upgrades.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunBonuses {
    /// Click base doubles once per level.
    pub efficiency_level: u32,
    pub rate_multiplier: f64,
    /// Fraction of the phase tax waived, 0..=1.
    pub tax_relief: f64,
}

impl Default for RunBonuses {
    fn default() -> Self {
        Self {
            efficiency_level: 0,
            rate_multiplier: 1.0,
            tax_relief: 0.0,
        }
    }
}

impl RunBonuses {
    pub fn from_state(upgrades: &[UpgradeConfig], state: &GameState) -> Self {
        let mut bonuses = RunBonuses::default();
        for up in upgrades {
            let level = state.upgrade_level(&up.id);
            if level == 0 {
                continue;
            }
            match &up.effect {
                UpgradeEffect::ClickEfficiency => bonuses.efficiency_level += level,
                UpgradeEffect::RateMultiplier(m) => {
                    bonuses.rate_multiplier *= m.powi(level as i32)
                }
                UpgradeEffect::TaxRelief(r) => bonuses.tax_relief += r * level as f64,
            }
        }
        bonuses.tax_relief = bonuses.tax_relief.clamp(0.0, 1.0);
        bonuses
    }
}

/// Price of the next level: `cost * cost_growth^level`, in CC.
pub fn upgrade_cost(up: &UpgradeConfig, level: u32) -> u64 {
    (up.cost as f64 * up.cost_growth.powi(level as i32)).floor() as u64
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpgradePurchase {
    pub id: String,
    pub level: u32,
    pub cost: u64,
}

/// Buy the next level of a run upgrade.
pub fn buy_upgrade(
    config: &EngineConfig,
    state: &mut GameState,
    id: &str,
) -> Result<UpgradePurchase, Rejection> {
    let up = config
        .upgrade(id)
        .ok_or_else(|| Rejection::UnknownId(id.to_string()))?;
    let level = state.upgrade_level(id);
    if level >= up.max_level {
        return Err(Rejection::MaxLevel {
            id: id.to_string(),
            max_level: up.max_level,
        });
    }
    let cost = upgrade_cost(up, level);
    if !state.debit(Currency::Cc, cost) {
        return Err(Rejection::InsufficientFunds {
            currency: Currency::Cc,
            needed: cost,
            available: state.cc,
        });
    }
    state.upgrades.insert(id.to_string(), level + 1);
    Ok(UpgradePurchase {
        id: id.to_string(),
        level: level + 1,
        cost,
    })
}
