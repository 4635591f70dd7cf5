//! Phase: the global 1..=6 escalation level.
//!
//! Phase is a pure function of `total_clicks` and the threshold table. Every
//! other module reads it to index its own probability tables; only the click
//! path and ascension ever write it.

use crate::config::{ModifierPhases, PhaseConfig};

/// Highest phase whose threshold is `<= total_clicks`.
///
/// `shield` stretches every threshold by that fraction (rounded up), which
/// delays escalation without reordering phases.
pub fn phase_for(total_clicks: u64, thresholds: &[u64], shield: f64) -> u8 {
    let stretch = 1.0 + shield.max(0.0);
    let reached = thresholds
        .iter()
        .take_while(|&&t| (t as f64 * stretch).ceil() as u64 <= total_clicks)
        .count();
    reached.clamp(1, u8::MAX as usize) as u8
}

/// Look up a per-phase table entry. Phases past the end of the table reuse
/// the last entry.
pub fn by_phase(table: &[f64], phase: u8) -> f64 {
    let idx = (phase.max(1) - 1) as usize;
    table
        .get(idx)
        .or_else(|| table.last())
        .copied()
        .unwrap_or(0.0)
}

/// Which adverse click modifiers the current phase switches on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub tax: bool,
    pub audit: bool,
    pub throttle: bool,
    pub decay: bool,
    pub depreciation: bool,
}

impl Modifiers {
    pub fn for_phase(phase: u8, table: &ModifierPhases) -> Self {
        let on = |first: u8| first != 0 && phase >= first;
        Self {
            tax: on(table.tax),
            audit: on(table.audit),
            throttle: on(table.throttle),
            decay: on(table.decay),
            depreciation: on(table.depreciation),
        }
    }
}

/// Tax rate for `phase`, after run-upgrade relief.
pub fn tax_rate(config: &PhaseConfig, phase: u8, relief: f64) -> f64 {
    by_phase(&config.tax_rates, phase) * (1.0 - relief).clamp(0.0, 1.0)
}
