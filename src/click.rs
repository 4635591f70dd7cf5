//! Click pipeline.
//!
//! [`compute_click_value`] is pure given its context and dice. The order of
//! steps is fixed so that the same inputs always yield the same value.
//! [`perform_click`] applies the result and the per-click bookkeeping.

use crate::config::{ClickConfig, EngineConfig};
use crate::phase::{phase_for, tax_rate, Modifiers};
use crate::prestige::Perks;
use crate::rng::Dice;
use crate::state::{Currency, EscrowHold, GameState};
use crate::upgrades::RunBonuses;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClickValue {
    pub gross: u64,
    pub net: u64,
    pub tax_amount: u64,
    pub escrowed: bool,
    /// How long the presentation layer should hold back the "+N" popup.
    pub display_delay_ms: u64,
}

/// Everything the pipeline reads, resolved from state ahead of time.
#[derive(Clone, Debug)]
pub struct ClickContext<'a> {
    pub config: &'a ClickConfig,
    pub click_bonus: f64,
    pub efficiency_level: u32,
    pub collectibles: u32,
    pub rate: f64,
    pub total_clicks: u64,
    pub click_multiplier: f64,
    pub permanent_multiplier: f64,
    pub modifiers: Modifiers,
    pub tax_rate: f64,
    pub holiday: bool,
    pub frozen: bool,
}

impl<'a> ClickContext<'a> {
    pub fn from_state(config: &'a EngineConfig, state: &GameState, rate: f64, now_ms: u64) -> Self {
        let perks = Perks::from_state(&config.permanent_upgrades, state);
        let bonuses = RunBonuses::from_state(&config.upgrades, state);
        Self {
            config: &config.click,
            click_bonus: perks.click_bonus,
            efficiency_level: bonuses.efficiency_level,
            collectibles: state.collectibles,
            rate,
            total_clicks: state.total_clicks,
            click_multiplier: state.click_multiplier(now_ms),
            permanent_multiplier: state.permanent_multiplier,
            modifiers: Modifiers::for_phase(state.phase, &config.phase.modifiers),
            tax_rate: tax_rate(&config.phase, state.phase, bonuses.tax_relief),
            holiday: state.holiday_active(now_ms),
            frozen: state.clicks_frozen(now_ms),
        }
    }
}

pub fn compute_click_value(ctx: &ClickContext<'_>, dice: &mut dyn Dice) -> ClickValue {
    let cfg = ctx.config;

    let mut base = 1.0 + ctx.click_bonus;
    if ctx.efficiency_level > 0 {
        base *= 2f64.powi(ctx.efficiency_level as i32);
    }
    if ctx.modifiers.decay {
        let decay = 1.0 - cfg.decay_per_collectible * ctx.collectibles as f64;
        base *= decay.max(cfg.decay_floor);
    }
    base += cfg.rate_share * ctx.rate;
    if ctx.modifiers.depreciation && cfg.depreciation_cycle > 0 {
        let n = ctx.total_clicks % cfg.depreciation_cycle;
        base *= cfg.depreciation_factor.powi(n as i32);
    }

    let mut gross = (base.round() as u64).max(1);
    if ctx.click_multiplier != 1.0 {
        gross = (gross as f64 * ctx.click_multiplier).floor() as u64;
    }
    if ctx.permanent_multiplier > 1.0 {
        gross = (gross as f64 * ctx.permanent_multiplier).floor() as u64;
    }

    if ctx.frozen {
        return ClickValue::default();
    }
    if ctx.holiday {
        return ClickValue {
            gross,
            net: gross,
            ..ClickValue::default()
        };
    }

    let tax_amount = if ctx.modifiers.tax {
        (gross as f64 * ctx.tax_rate).floor() as u64
    } else {
        0
    };
    let escrowed = ctx.modifiers.audit && dice.chance(cfg.escrow_probability);
    let display_delay_ms = if ctx.modifiers.throttle {
        dice.uniform(0.0, cfg.throttle_max_delay_ms as f64).round() as u64
    } else {
        0
    };
    let net = if escrowed {
        0
    } else {
        gross.saturating_sub(tax_amount).max(1)
    };

    ClickValue {
        gross,
        net,
        tax_amount,
        escrowed,
        display_delay_ms,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClickOutcome {
    pub value: ClickValue,
    /// `(from, to)` when this click crossed a threshold.
    pub phase_change: Option<(u8, u8)>,
    /// Span of the full rapid-input window, when it was under the limit.
    pub rapid_span_ms: Option<u64>,
    pub save_due: bool,
}

/// Apply one click to `state`.
pub fn perform_click(
    config: &EngineConfig,
    state: &mut GameState,
    rate: f64,
    now_ms: u64,
    dice: &mut dyn Dice,
) -> ClickOutcome {
    let value = compute_click_value(&ClickContext::from_state(config, state, rate, now_ms), dice);
    let cfg = &config.click;

    state.total_clicks += 1;
    state.session_clicks += 1;

    if value.escrowed {
        state.escrow.push(EscrowHold {
            amount: value.gross,
            release_at_ms: now_ms + cfg.escrow_delay_ms,
        });
    } else if value.net > 0 {
        state.credit(Currency::Eu, value.net);
    }

    let rapid_span_ms = track_rapid_input(state, cfg, now_ms);
    state.last_input_ms = now_ms;
    state.idle_reported = false;

    let perks = Perks::from_state(&config.permanent_upgrades, state);
    let derived = phase_for(state.total_clicks, &config.phase.thresholds, perks.phase_shield);
    let phase_change = if derived > state.phase {
        let from = state.phase;
        state.phase = derived;
        Some((from, derived))
    } else {
        None
    };

    let save_due = cfg.save_every_clicks > 0 && state.total_clicks % cfg.save_every_clicks == 0;

    ClickOutcome {
        value,
        phase_change,
        rapid_span_ms,
        save_due,
    }
}

/// Push `now_ms` into the rolling window. Returns the window span when the
/// window is full and shorter than the configured limit.
fn track_rapid_input(state: &mut GameState, cfg: &ClickConfig, now_ms: u64) -> Option<u64> {
    if cfg.rapid_window == 0 {
        return None;
    }
    state.click_times.push_back(now_ms);
    while state.click_times.len() > cfg.rapid_window {
        state.click_times.pop_front();
    }
    if state.click_times.len() < cfg.rapid_window {
        return None;
    }
    let oldest = *state.click_times.front()?;
    let span = now_ms.saturating_sub(oldest);
    (span < cfg.rapid_span_ms).then_some(span)
}
