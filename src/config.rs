//! Tuning tables.
//!
//! Every constant the engine uses lives here. `EngineConfig::default()` is
//! the shipped balance; hosts can override any section from JSON, and missing
//! sections or fields fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::Currency;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub production: ProductionConfig,
    pub upgrades: Vec<UpgradeConfig>,
    pub permanent_upgrades: Vec<PermanentUpgradeConfig>,
    pub phase: PhaseConfig,
    pub click: ClickConfig,
    pub market: MarketConfig,
    pub awards: AwardConfig,
    pub prestige: PrestigeConfig,
    pub timing: TimingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            production: ProductionConfig::default(),
            upgrades: default_upgrades(),
            permanent_upgrades: default_permanent_upgrades(),
            phase: PhaseConfig::default(),
            click: ClickConfig::default(),
            market: MarketConfig::default(),
            awards: AwardConfig::default(),
            prestige: PrestigeConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject tables the engine cannot index safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phase.thresholds.is_empty() || self.phase.thresholds[0] != 0 {
            return Err(ConfigError::Invalid(
                "phase thresholds must start at 0".into(),
            ));
        }
        if self.phase.thresholds.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::Invalid(
                "phase thresholds must be non-decreasing".into(),
            ));
        }
        let phases = self.phase.thresholds.len();
        for (name, len) in [
            ("phase.tax_rates", self.phase.tax_rates.len()),
            ("market.bust_chance", self.market.bust_chance.len()),
            (
                "market.seizure_phase_multiplier",
                self.market.seizure_phase_multiplier.len(),
            ),
        ] {
            if len < phases {
                return Err(ConfigError::Invalid(format!(
                    "{name} needs one entry per phase ({phases}), got {len}"
                )));
            }
        }
        for pair in &self.market.pairs {
            if pair.from.next().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{} has no next currency to convert into",
                    pair.from
                )));
            }
            if pair.min > pair.max || pair.min < 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "rate band for {} must satisfy 1 <= min <= max",
                    pair.from
                )));
            }
        }
        if self.market.personas.is_empty() {
            return Err(ConfigError::Invalid("at least one persona is required".into()));
        }
        if self.market.fee_divisor == 0 {
            return Err(ConfigError::Invalid("market.fee_divisor must be non-zero".into()));
        }
        if self.awards.spawn_min_ms > self.awards.spawn_max_ms {
            return Err(ConfigError::Invalid(
                "awards.spawn_min_ms must not exceed spawn_max_ms".into(),
            ));
        }
        if self.timing.tick_ms == 0 {
            return Err(ConfigError::Invalid("timing.tick_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn tier(&self, id: &str) -> Option<&TierConfig> {
        self.production.tiers.iter().find(|t| t.id == id)
    }

    pub fn upgrade(&self, id: &str) -> Option<&UpgradeConfig> {
        self.upgrades.iter().find(|u| u.id == id)
    }

    pub fn permanent_upgrade(&self, id: &str) -> Option<&PermanentUpgradeConfig> {
        self.permanent_upgrades.iter().find(|u| u.id == id)
    }

    pub fn pair(&self, from: Currency) -> Option<&PairConfig> {
        self.market.pairs.iter().find(|p| p.from == from)
    }
}

// ── Production ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    pub tiers: Vec<TierConfig>,
    /// Per-unit cost growth.
    pub cost_growth: f64,
    /// Total units across all tiers that fires the global milestone.
    pub global_milestone: u64,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        let milestones = vec![1, 10, 25, 50, 100];
        let tier = |id: &str, name: &str, base_cost: f64, base_rate: f64| TierConfig {
            id: id.into(),
            name: name.into(),
            base_cost,
            base_rate,
            milestones: milestones.clone(),
        };
        Self {
            tiers: vec![
                tier("intern", "Intern", 15.0, 0.1),
                tier("clerk", "Clerk", 100.0, 1.0),
                tier("office", "Field Office", 1_100.0, 8.0),
                tier("bureau", "Bureau", 12_000.0, 47.0),
                tier("ministry", "Ministry", 130_000.0, 260.0),
                tier("treasury", "Treasury", 1_400_000.0, 1_400.0),
            ],
            cost_growth: 1.15,
            global_milestone: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub id: String,
    pub name: String,
    /// Cost of the first unit, in EU.
    pub base_cost: f64,
    /// EU per second per unit.
    pub base_rate: f64,
    /// Owned counts that fire a milestone.
    #[serde(default)]
    pub milestones: Vec<u32>,
}

// ── Run upgrades ────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    pub id: String,
    pub name: String,
    /// Cost of the first level, in CC.
    pub cost: u64,
    /// 1 for one-time upgrades.
    pub max_level: u32,
    /// Cost multiplier per owned level.
    #[serde(default = "default_upgrade_growth")]
    pub cost_growth: f64,
    pub effect: UpgradeEffect,
}

fn default_upgrade_growth() -> f64 {
    2.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum UpgradeEffect {
    /// Click base doubles per level.
    ClickEfficiency,
    /// Production multiplied by this per level.
    RateMultiplier(f64),
    /// Tax rate reduced by this fraction per level.
    TaxRelief(f64),
}

/// Id of the upgrade whose level feeds the click efficiency step.
pub const EFFICIENCY_UPGRADE: &str = "efficiency";

pub fn default_upgrades() -> Vec<UpgradeConfig> {
    vec![
        UpgradeConfig {
            id: EFFICIENCY_UPGRADE.into(),
            name: "Process Efficiency".into(),
            cost: 5,
            max_level: 5,
            cost_growth: 3.0,
            effect: UpgradeEffect::ClickEfficiency,
        },
        UpgradeConfig {
            id: "double_entry".into(),
            name: "Double-Entry Bookkeeping".into(),
            cost: 20,
            max_level: 1,
            cost_growth: 1.0,
            effect: UpgradeEffect::RateMultiplier(1.5),
        },
        UpgradeConfig {
            id: "loophole".into(),
            name: "Convenient Loophole".into(),
            cost: 60,
            max_level: 1,
            cost_growth: 1.0,
            effect: UpgradeEffect::TaxRelief(0.5),
        },
    ]
}

// ── Permanent upgrades ──────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermanentUpgradeConfig {
    pub id: String,
    pub name: String,
    /// Linear cost base, in PP: `base_cost * (level + 1)`.
    pub base_cost: u64,
    pub max_level: u32,
    pub effect: PermanentEffect,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PermanentEffect {
    /// Flat click value per level.
    ClickBonus(f64),
    /// Production cost discount per level.
    CostDiscount(f64),
    /// Phase thresholds stretched by this fraction per level.
    PhaseShield(f64),
    /// Subtracted from every conversion rate per level.
    ConversionDiscount(f64),
    /// Feeds the temporal factor of the permanent multiplier.
    Temporal,
    /// Units of each tier kept through ascension per level.
    CarryOver(u32),
    /// EU granted at the start of each run per level.
    StartingCapital(u64),
    /// Flat EU per second per level.
    StartingRate(f64),
}

pub fn default_permanent_upgrades() -> Vec<PermanentUpgradeConfig> {
    let up = |id: &str, name: &str, base_cost: u64, max_level: u32, effect: PermanentEffect| {
        PermanentUpgradeConfig {
            id: id.into(),
            name: name.into(),
            base_cost,
            max_level,
            effect,
        }
    };
    vec![
        up("firm_handshake", "Firm Handshake", 1, 10, PermanentEffect::ClickBonus(1.0)),
        up("bulk_procurement", "Bulk Procurement", 2, 5, PermanentEffect::CostDiscount(0.02)),
        up("red_tape", "Red Tape", 3, 5, PermanentEffect::PhaseShield(0.10)),
        up("insider_rates", "Insider Rates", 4, 3, PermanentEffect::ConversionDiscount(1.0)),
        up("temporal_audit", "Temporal Audit", 5, 10, PermanentEffect::Temporal),
        up("succession_plan", "Succession Plan", 3, 5, PermanentEffect::CarryOver(1)),
        up("seed_funding", "Seed Funding", 1, 10, PermanentEffect::StartingCapital(1_000)),
        up("standing_orders", "Standing Orders", 2, 10, PermanentEffect::StartingRate(0.5)),
    ]
}

// ── Phase ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Click counts that enter phases 1..=N.
    pub thresholds: Vec<u64>,
    /// Tax rate by phase (index 0 = phase 1).
    pub tax_rates: Vec<f64>,
    /// First phase in which each modifier is active. 0 disables it.
    pub modifiers: ModifierPhases,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![0, 50, 200, 500, 1_000, 2_000],
            tax_rates: vec![0.0, 0.10, 0.15, 0.20, 0.25, 0.30],
            modifiers: ModifierPhases::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierPhases {
    pub tax: u8,
    pub audit: u8,
    pub throttle: u8,
    pub decay: u8,
    pub depreciation: u8,
}

impl Default for ModifierPhases {
    fn default() -> Self {
        Self {
            tax: 2,
            audit: 3,
            throttle: 4,
            decay: 5,
            depreciation: 6,
        }
    }
}

// ── Click ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub escrow_probability: f64,
    pub escrow_delay_ms: u64,
    pub throttle_max_delay_ms: u64,
    /// Share of the aggregate rate added to the click base.
    pub rate_share: f64,
    pub decay_per_collectible: f64,
    pub decay_floor: f64,
    pub depreciation_factor: f64,
    pub depreciation_cycle: u64,
    pub rapid_window: usize,
    pub rapid_span_ms: u64,
    pub idle_ms: u64,
    pub save_every_clicks: u64,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            escrow_probability: 0.20,
            escrow_delay_ms: 10_000,
            throttle_max_delay_ms: 2_000,
            rate_share: 0.01,
            decay_per_collectible: 0.005,
            decay_floor: 0.50,
            depreciation_factor: 0.99,
            depreciation_cycle: 100,
            rapid_window: 10,
            rapid_span_ms: 2_000,
            idle_ms: 30_000,
            save_every_clicks: 50,
        }
    }
}

// ── Market ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub pairs: Vec<PairConfig>,
    /// Samples kept per pair for trend classification.
    pub history_len: usize,
    /// Bust probability by phase.
    pub bust_chance: Vec<f64>,
    pub bust_fraction: (f64, f64),
    pub seizure_fraction: (f64, f64),
    /// Multiplies the persona's seizure rate, by phase.
    pub seizure_phase_multiplier: Vec<f64>,
    /// DB→TK processing fee is `gained / fee_divisor`.
    pub fee_divisor: u64,
    pub personas: Vec<PersonaConfig>,
    pub synthetic_samples: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            pairs: vec![
                PairConfig::new(Currency::Eu, 7.0, (1.3, 13.0, 0.4), (0.6, 7.0), 0.45, (6.3, 8.7)),
                PairConfig::new(Currency::St, 13.0, (2.2, 19.0, 1.1), (0.9, 5.0), 0.6, (11.4, 15.6)),
                PairConfig::new(Currency::Cc, 5.0, (0.9, 11.0, 2.0), (0.4, 3.0), 0.3, (4.2, 6.4)),
                PairConfig::new(Currency::Db, 10.0, (1.8, 23.0, 0.7), (0.7, 9.0), 0.5, (8.6, 12.4)),
            ],
            history_len: 10,
            bust_chance: vec![0.0, 0.05, 0.10, 0.15, 0.20, 0.25],
            bust_fraction: (0.10, 0.40),
            seizure_fraction: (0.20, 0.50),
            seizure_phase_multiplier: vec![0.5, 0.75, 1.0, 1.25, 1.5, 2.0],
            fee_divisor: 3,
            personas: vec![
                PersonaConfig::new("The Benevolent Regent", 0.02),
                PersonaConfig::new("The Tax Farmer", 0.05),
                PersonaConfig::new("The Mad King", 0.09),
                PersonaConfig::new("The Usurper", 0.14),
            ],
            synthetic_samples: 30,
        }
    }
}

/// Oscillation constants for one conversion pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub from: Currency,
    pub base: f64,
    pub amp1: f64,
    pub period1: f64,
    pub phase1: f64,
    pub amp2: f64,
    pub period2: f64,
    pub noise: f64,
    pub min: f64,
    pub max: f64,
}

impl PairConfig {
    pub fn new(
        from: Currency,
        base: f64,
        (amp1, period1, phase1): (f64, f64, f64),
        (amp2, period2): (f64, f64),
        noise: f64,
        (min, max): (f64, f64),
    ) -> Self {
        Self {
            from,
            base,
            amp1,
            period1,
            phase1,
            amp2,
            period2,
            noise,
            min,
            max,
        }
    }

    /// A pair pinned to `rate` with no oscillation.
    pub fn flat(from: Currency, rate: f64) -> Self {
        Self::new(from, rate, (0.0, 1.0, 0.0), (0.0, 1.0), 0.0, (rate, rate))
    }

    pub fn to(&self) -> Currency {
        self.from.next().unwrap_or(self.from)
    }

    /// `"EU-ST"`.
    pub fn key(&self) -> String {
        format!("{}-{}", self.from, self.to())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub label: String,
    pub seizure_rate: f64,
}

impl PersonaConfig {
    pub fn new(label: &str, seizure_rate: f64) -> Self {
        Self {
            label: label.into(),
            seizure_rate,
        }
    }
}

// ── Awards ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardConfig {
    pub spawn_min_ms: u64,
    pub spawn_max_ms: u64,
    /// How long an award waits before auto-dismissing.
    pub lifetime_ms: u64,
    /// First phase in which wrath audits can appear.
    pub wrath_phase: u8,
    pub wrath_chance: f64,
    pub frenzy: BuffSpec,
    pub click_frenzy: BuffSpec,
    pub lump_seconds: f64,
    pub holiday_ms: u64,
    pub weak_frenzy: BuffSpec,
    pub weak_click_frenzy: BuffSpec,
    pub weak_lump_seconds: f64,
    /// Fraction of EU lost to a wrath levy.
    pub levy_fraction: f64,
    pub slowdown: BuffSpec,
    pub freeze_ms: u64,
}

impl Default for AwardConfig {
    fn default() -> Self {
        Self {
            spawn_min_ms: 120_000,
            spawn_max_ms: 300_000,
            lifetime_ms: 12_000,
            wrath_phase: 5,
            wrath_chance: 0.5,
            frenzy: BuffSpec::new(7.0, 77_000),
            click_frenzy: BuffSpec::new(7.0, 13_000),
            lump_seconds: 60.0,
            holiday_ms: 60_000,
            weak_frenzy: BuffSpec::new(3.0, 30_000),
            weak_click_frenzy: BuffSpec::new(3.0, 10_000),
            weak_lump_seconds: 30.0,
            levy_fraction: 0.05,
            slowdown: BuffSpec::new(0.5, 60_000),
            freeze_ms: 15_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuffSpec {
    pub multiplier: f64,
    pub duration_ms: u64,
}

impl BuffSpec {
    pub fn new(multiplier: f64, duration_ms: u64) -> Self {
        Self {
            multiplier,
            duration_ms,
        }
    }
}

// ── Prestige ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrestigeConfig {
    /// Lifetime EU divided by this before the square root.
    pub points_divisor: f64,
    /// Multiplier gain per banked point.
    pub point_bonus: f64,
    /// Multiplier gain per temporal upgrade level.
    pub temporal_bonus: f64,
}

impl Default for PrestigeConfig {
    fn default() -> Self {
        Self {
            points_divisor: 1_000_000.0,
            point_bonus: 0.01,
            temporal_bonus: 0.10,
        }
    }
}

// ── Timing ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_ms: u64,
    /// Longest gap a single `advance` call will catch up on.
    pub max_catch_up_ms: u64,
    pub autosave_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            max_catch_up_ms: 60_000,
            autosave_ms: 30_000,
        }
    }
}
