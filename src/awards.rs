//! Awards and audits: the single floating bonus that spawns every few
//! minutes, waits briefly to be collected, then applies a random effect.
//!
//! From the wrath phase on, a collection can also go wrong.

use crate::config::{AwardConfig, BuffSpec};
use crate::error::Rejection;
use crate::rng::Dice;
use crate::state::{BuffKind, Currency, GameState, PendingAward, TimedBuff};

#[derive(Clone, Debug, PartialEq)]
pub enum AwardEffect {
    Frenzy { multiplier: f64, duration_ms: u64 },
    ClickFrenzy { multiplier: f64, duration_ms: u64 },
    Lump { amount: u64 },
    Holiday { duration_ms: u64 },
    Levy { amount: u64 },
    Slowdown { multiplier: f64, duration_ms: u64 },
    ClickFreeze { duration_ms: u64 },
}

impl AwardEffect {
    pub fn name(&self) -> &'static str {
        match self {
            AwardEffect::Frenzy { .. } => "Production Frenzy",
            AwardEffect::ClickFrenzy { .. } => "Click Frenzy",
            AwardEffect::Lump { .. } => "Windfall",
            AwardEffect::Holiday { .. } => "Tax Holiday",
            AwardEffect::Levy { .. } => "Emergency Levy",
            AwardEffect::Slowdown { .. } => "Work Slowdown",
            AwardEffect::ClickFreeze { .. } => "Hiring Freeze",
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            AwardEffect::Levy { .. } | AwardEffect::Slowdown { .. } | AwardEffect::ClickFreeze { .. }
        )
    }
}

/// What a tick did to the award slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AwardTick {
    Spawned { expires_at_ms: u64 },
    Dismissed,
}

/// Pick the next spawn time.
pub fn schedule_next(config: &AwardConfig, state: &mut GameState, now_ms: u64, dice: &mut dyn Dice) {
    let delay = dice
        .uniform(config.spawn_min_ms as f64, config.spawn_max_ms as f64)
        .round() as u64;
    state.next_award_ms = Some(now_ms + delay);
}

/// Spawn, expire or reschedule the award slot.
pub fn tick(
    config: &AwardConfig,
    state: &mut GameState,
    rate: f64,
    now_ms: u64,
    dice: &mut dyn Dice,
) -> Option<AwardTick> {
    if let Some(award) = &state.award {
        if now_ms >= award.expires_at_ms {
            state.award = None;
            schedule_next(config, state, now_ms, dice);
            return Some(AwardTick::Dismissed);
        }
        return None;
    }

    let Some(due) = state.next_award_ms else {
        schedule_next(config, state, now_ms, dice);
        return None;
    };
    if now_ms < due {
        return None;
    }
    if rate <= 0.0 {
        schedule_next(config, state, now_ms, dice);
        return None;
    }

    let expires_at_ms = now_ms + config.lifetime_ms;
    state.award = Some(PendingAward {
        spawned_at_ms: now_ms,
        expires_at_ms,
    });
    state.next_award_ms = None;
    Some(AwardTick::Spawned { expires_at_ms })
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collected {
    pub is_wrath: bool,
    pub effect: AwardEffect,
}

/// Collect the pending award and apply its effect.
pub fn collect(
    config: &AwardConfig,
    state: &mut GameState,
    rate: f64,
    now_ms: u64,
    dice: &mut dyn Dice,
) -> Result<Collected, Rejection> {
    match &state.award {
        Some(award) if now_ms < award.expires_at_ms => {}
        _ => return Err(Rejection::NoAward),
    }
    state.award = None;

    let is_wrath = state.phase >= config.wrath_phase && dice.chance(config.wrath_chance);
    let effect = if is_wrath {
        draw_wrath(config, state, dice)
    } else if state.phase >= config.wrath_phase {
        draw_weak(config, rate, dice)
    } else {
        draw_blessing(config, rate, dice)
    };
    apply(state, &effect, now_ms);

    state.collectibles += 1;
    schedule_next(config, state, now_ms, dice);
    Ok(Collected { is_wrath, effect })
}

fn lump(rate: f64, seconds: f64) -> u64 {
    (rate * seconds).floor().max(0.0) as u64
}

fn draw_blessing(config: &AwardConfig, rate: f64, dice: &mut dyn Dice) -> AwardEffect {
    match dice.pick(4) {
        0 => frenzy(config.frenzy),
        1 => click_frenzy(config.click_frenzy),
        2 => AwardEffect::Lump {
            amount: lump(rate, config.lump_seconds),
        },
        _ => AwardEffect::Holiday {
            duration_ms: config.holiday_ms,
        },
    }
}

fn draw_weak(config: &AwardConfig, rate: f64, dice: &mut dyn Dice) -> AwardEffect {
    match dice.pick(3) {
        0 => frenzy(config.weak_frenzy),
        1 => click_frenzy(config.weak_click_frenzy),
        _ => AwardEffect::Lump {
            amount: lump(rate, config.weak_lump_seconds),
        },
    }
}

fn draw_wrath(config: &AwardConfig, state: &GameState, dice: &mut dyn Dice) -> AwardEffect {
    match dice.pick(3) {
        0 => AwardEffect::Levy {
            amount: (state.eu as f64 * config.levy_fraction).floor() as u64,
        },
        1 => AwardEffect::Slowdown {
            multiplier: config.slowdown.multiplier,
            duration_ms: config.slowdown.duration_ms,
        },
        _ => AwardEffect::ClickFreeze {
            duration_ms: config.freeze_ms,
        },
    }
}

fn frenzy(spec: BuffSpec) -> AwardEffect {
    AwardEffect::Frenzy {
        multiplier: spec.multiplier,
        duration_ms: spec.duration_ms,
    }
}

fn click_frenzy(spec: BuffSpec) -> AwardEffect {
    AwardEffect::ClickFrenzy {
        multiplier: spec.multiplier,
        duration_ms: spec.duration_ms,
    }
}

fn apply(state: &mut GameState, effect: &AwardEffect, now_ms: u64) {
    let buff = |kind: BuffKind, duration_ms: u64| TimedBuff {
        kind,
        label: effect.name().to_string(),
        expires_at_ms: now_ms + duration_ms,
    };
    match *effect {
        AwardEffect::Frenzy {
            multiplier,
            duration_ms,
        }
        | AwardEffect::Slowdown {
            multiplier,
            duration_ms,
        } => state
            .buffs
            .push(buff(BuffKind::RateMultiplier(multiplier), duration_ms)),
        AwardEffect::ClickFrenzy {
            multiplier,
            duration_ms,
        } => state
            .buffs
            .push(buff(BuffKind::ClickMultiplier(multiplier), duration_ms)),
        AwardEffect::Holiday { duration_ms } => {
            state.buffs.push(buff(BuffKind::Holiday, duration_ms))
        }
        AwardEffect::ClickFreeze { duration_ms } => {
            state.buffs.push(buff(BuffKind::ClickFreeze, duration_ms))
        }
        AwardEffect::Lump { amount } => state.credit(Currency::Eu, amount),
        AwardEffect::Levy { amount } => {
            state.drain(Currency::Eu, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedDice;

    fn spawned(state: &mut GameState, now_ms: u64) {
        state.award = Some(PendingAward {
            spawned_at_ms: now_ms,
            expires_at_ms: now_ms + 12_000,
        });
    }

    #[test]
    fn first_tick_schedules_spawn() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        let mut dice = ScriptedDice::constant(0.0);
        assert_eq!(tick(&config, &mut state, 1.0, 0, &mut dice), None);
        assert_eq!(state.next_award_ms, Some(120_000));
    }

    #[test]
    fn spawns_after_delay() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        state.next_award_ms = Some(120_000);
        let mut dice = ScriptedDice::constant(0.5);
        assert_eq!(tick(&config, &mut state, 1.0, 119_000, &mut dice), None);
        assert_eq!(
            tick(&config, &mut state, 1.0, 120_000, &mut dice),
            Some(AwardTick::Spawned {
                expires_at_ms: 132_000
            })
        );
        assert!(state.award.is_some());
    }

    #[test]
    fn no_spawn_without_production() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        state.next_award_ms = Some(1_000);
        let mut dice = ScriptedDice::constant(1.0);
        assert_eq!(tick(&config, &mut state, 0.0, 1_000, &mut dice), None);
        assert!(state.award.is_none());
        assert_eq!(state.next_award_ms, Some(301_000));
    }

    #[test]
    fn uncollected_award_dismisses() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        spawned(&mut state, 0);
        let mut dice = ScriptedDice::constant(0.0);
        assert_eq!(tick(&config, &mut state, 1.0, 11_000, &mut dice), None);
        assert_eq!(
            tick(&config, &mut state, 1.0, 12_000, &mut dice),
            Some(AwardTick::Dismissed)
        );
        assert!(state.award.is_none());
        assert!(state.next_award_ms.is_some());
    }

    #[test]
    fn collect_without_award_fails() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        let err = collect(&config, &mut state, 1.0, 0, &mut ScriptedDice::constant(0.0));
        assert_eq!(err, Err(Rejection::NoAward));
    }

    #[test]
    fn early_phase_lump_sum() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        spawned(&mut state, 0);
        // pick(4) with 0.6 -> index 2
        let mut dice = ScriptedDice::constant(0.6);
        let got = collect(&config, &mut state, 2.5, 1_000, &mut dice).unwrap();
        assert!(!got.is_wrath);
        assert_eq!(got.effect, AwardEffect::Lump { amount: 150 });
        assert_eq!(state.eu, 150);
        assert_eq!(state.collectibles, 1);
        assert!(state.next_award_ms.is_some());
    }

    #[test]
    fn frenzy_adds_timed_buff() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        spawned(&mut state, 0);
        let mut dice = ScriptedDice::constant(0.0);
        let got = collect(&config, &mut state, 1.0, 1_000, &mut dice).unwrap();
        assert_eq!(got.effect.name(), "Production Frenzy");
        assert!((state.rate_multiplier(1_000) - 7.0).abs() < 1e-9);
        assert!((state.rate_multiplier(78_000) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn wrath_levy_takes_five_percent() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        state.phase = 5;
        state.credit(Currency::Eu, 1_000);
        spawned(&mut state, 0);
        // gate 0.0 -> wrath, pick(3) 0.0 -> levy
        let mut dice = ScriptedDice::constant(0.0);
        let got = collect(&config, &mut state, 1.0, 1_000, &mut dice).unwrap();
        assert!(got.is_wrath);
        assert!(got.effect.is_negative());
        assert_eq!(got.effect, AwardEffect::Levy { amount: 50 });
        assert_eq!(state.eu, 950);
        assert_eq!(state.lifetime_eu, 1_000);
    }

    #[test]
    fn wrath_freeze_blocks_clicks() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        state.phase = 6;
        spawned(&mut state, 0);
        let mut dice = ScriptedDice::new(vec![0.1, 0.9, 0.5]);
        let got = collect(&config, &mut state, 1.0, 1_000, &mut dice).unwrap();
        assert_eq!(got.effect, AwardEffect::ClickFreeze { duration_ms: 15_000 });
        assert!(state.clicks_frozen(15_999));
        assert!(!state.clicks_frozen(16_000));
    }

    #[test]
    fn late_phase_blessing_is_weaker() {
        let config = AwardConfig::default();
        let mut state = GameState::new();
        state.phase = 5;
        spawned(&mut state, 0);
        // gate 0.9 -> kind, pick(3) 0.0 -> weak frenzy
        let mut dice = ScriptedDice::new(vec![0.9, 0.0, 0.5]);
        let got = collect(&config, &mut state, 1.0, 1_000, &mut dice).unwrap();
        assert!(!got.is_wrath);
        assert_eq!(
            got.effect,
            AwardEffect::Frenzy {
                multiplier: 3.0,
                duration_ms: 30_000
            }
        );
    }
}
