//! Currency conversion: oscillating rates, bust, crown seizure, fees.
//!
//! Rates are recomputed once per second from two sine waves plus noise and
//! clamped to a per-pair band. Conversions always floor, so the source side
//! keeps the remainder and no currency is ever created.

use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::PI;

use chrono::NaiveDate;

use crate::config::{MarketConfig, PairConfig, PersonaConfig};
use crate::error::Rejection;
use crate::phase::by_phase;
use crate::rng::{fnv1a, Dice, Lcg};
use crate::state::{Currency, GameState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// `round(clamp(wave + noise, min, max) - discount)`, never below 1.
pub fn dynamic_rate(pair: &PairConfig, t: u64, noise: f64, discount: f64) -> u64 {
    let raw = wave(pair, t as f64) + noise;
    let clamped = raw.max(pair.min).min(pair.max);
    (clamped - discount).round().max(1.0) as u64
}

fn wave(pair: &PairConfig, t: f64) -> f64 {
    let s1 = if pair.period1 != 0.0 {
        pair.amp1 * (t * PI / pair.period1 + pair.phase1).sin()
    } else {
        0.0
    };
    let s2 = if pair.period2 != 0.0 {
        pair.amp2 * (t * PI / pair.period2).sin()
    } else {
        0.0
    };
    pair.base + s1 + s2
}

#[derive(Clone, Debug, Default)]
struct PairTrack {
    current: u64,
    samples: VecDeque<u64>,
}

/// Live rates for every pair. Session-only, rebuilt on load.
#[derive(Clone, Debug, Default)]
pub struct Market {
    t: u64,
    /// Milliseconds fed in but not yet a whole second.
    pending_ms: u64,
    pairs: BTreeMap<Currency, PairTrack>,
}

impl Market {
    /// Seed every pair with its noiseless rate at `t = 0`.
    pub fn new(config: &MarketConfig, discount: f64) -> Self {
        let mut market = Market::default();
        for pair in &config.pairs {
            let rate = dynamic_rate(pair, 0, 0.0, discount);
            market.pairs.insert(
                pair.from,
                PairTrack {
                    current: rate,
                    samples: VecDeque::from([rate]),
                },
            );
        }
        market
    }

    /// Feed `elapsed_ms` of engine time. Every pair is resampled once per
    /// whole second that elapses.
    pub fn update(
        &mut self,
        config: &MarketConfig,
        discount: f64,
        elapsed_ms: u64,
        dice: &mut dyn Dice,
    ) {
        self.pending_ms += elapsed_ms;
        while self.pending_ms >= 1_000 {
            self.pending_ms -= 1_000;
            self.resample(config, discount, dice);
        }
    }

    fn resample(&mut self, config: &MarketConfig, discount: f64, dice: &mut dyn Dice) {
        self.t += 1;
        for pair in &config.pairs {
            let noise = dice.uniform(-pair.noise, pair.noise);
            let rate = dynamic_rate(pair, self.t, noise, discount);
            let track = self.pairs.entry(pair.from).or_default();
            track.current = rate;
            track.samples.push_back(rate);
            while track.samples.len() > config.history_len.max(1) {
                track.samples.pop_front();
            }
        }
    }

    pub fn seconds(&self) -> u64 {
        self.t
    }

    pub fn rate(&self, from: Currency) -> Option<u64> {
        self.pairs.get(&from).map(|t| t.current)
    }

    pub fn samples(&self, from: Currency) -> Vec<u64> {
        self.pairs
            .get(&from)
            .map(|t| t.samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Oldest vs newest of the last three samples.
    pub fn trend(&self, from: Currency) -> Trend {
        let Some(track) = self.pairs.get(&from) else {
            return Trend::Stable;
        };
        let n = track.samples.len();
        if n < 2 {
            return Trend::Stable;
        }
        let oldest = track.samples[n.saturating_sub(3)];
        let newest = track.samples[n - 1];
        match newest.cmp(&oldest) {
            std::cmp::Ordering::Greater => Trend::Rising,
            std::cmp::Ordering::Less => Trend::Falling,
            std::cmp::Ordering::Equal => Trend::Stable,
        }
    }
}

/// The crown persona for a profile. Fixed for the life of the profile.
pub fn persona(config: &MarketConfig, first_session_ms: u64) -> Option<&PersonaConfig> {
    if config.personas.is_empty() {
        return None;
    }
    let seed = (first_session_ms as u32) ^ ((first_session_ms >> 32) as u32);
    let idx = Lcg::new(seed).next_u32() as usize % config.personas.len();
    config.personas.get(idx)
}

/// Reproducible per-day chart data for one pair. Never persisted.
pub fn synthetic_history(date: NaiveDate, pair: &PairConfig, samples: usize) -> Vec<f64> {
    let seed = fnv1a(&format!("{}{}", date.format("%Y-%m-%d"), pair.key()));
    let mut lcg = Lcg::new(seed);
    (0..samples)
        .map(|i| {
            let noise = (lcg.next_f64() * 2.0 - 1.0) * pair.noise;
            (wave(pair, i as f64) + noise).max(pair.min).min(pair.max)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Seizure {
    pub persona: String,
    pub seized: u64,
    /// DB balance left after the seizure.
    pub remaining: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Receipt {
    pub from: Currency,
    pub to: Currency,
    pub rate: u64,
    /// Source units actually consumed (`gained * rate`).
    pub spent: u64,
    /// Requested units left on the source side.
    pub remainder: u64,
    /// Target units before losses.
    pub gained: u64,
    pub lost: u64,
    pub fee: u64,
    pub delivered: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    pub seizure: Option<Seizure>,
    /// `None` when a seizure left too little to convert.
    pub receipt: Option<Receipt>,
}

/// Convert `amount` of `from` into the next currency at `rate`.
///
/// The DB leg is seized before division and charged a fee of
/// `gained / fee_divisor` after it. Bust applies to every leg from phase 2
/// and comes out of the same `gained`.
pub fn convert(
    config: &MarketConfig,
    state: &mut GameState,
    from: Currency,
    amount: u64,
    rate: u64,
    dice: &mut dyn Dice,
) -> Result<Conversion, Rejection> {
    let to = from
        .next()
        .ok_or_else(|| Rejection::UnknownId(from.code().to_string()))?;
    if amount == 0 {
        return Err(Rejection::ZeroAmount);
    }
    let available = state.balance(from);
    if amount > available {
        return Err(Rejection::InsufficientFunds {
            currency: from,
            needed: amount,
            available,
        });
    }
    let rate = rate.max(1);
    if amount / rate == 0 {
        return Err(Rejection::ZeroOutput { rate, available });
    }

    let mut input = amount;
    let mut seizure = None;
    if from == Currency::Db {
        if let Some(s) = crown_seizure(config, state, input, dice) {
            input = input.min(state.db);
            seizure = Some(s);
        }
    }

    let gained = input / rate;
    if gained == 0 {
        return Ok(Conversion {
            seizure,
            receipt: None,
        });
    }
    let spent = gained * rate;
    let remainder = input - spent;

    let lost = if dice.chance(by_phase(&config.bust_chance, state.phase)) {
        let (lo, hi) = config.bust_fraction;
        (gained as f64 * dice.uniform(lo, hi)).floor() as u64
    } else {
        0
    };
    let kept = gained - lost.min(gained);

    let (fee, delivered) = if from == Currency::Db && config.fee_divisor > 0 {
        let fee = gained / config.fee_divisor;
        (fee, kept.saturating_sub(fee).max(1))
    } else {
        (0, kept)
    };

    state.debit(from, spent);
    state.credit(to, delivered);

    Ok(Conversion {
        seizure,
        receipt: Some(Receipt {
            from,
            to,
            rate,
            spent,
            remainder,
            gained,
            lost,
            fee,
            delivered,
        }),
    })
}

fn crown_seizure(
    config: &MarketConfig,
    state: &mut GameState,
    input: u64,
    dice: &mut dyn Dice,
) -> Option<Seizure> {
    let persona = persona(config, state.first_session_ms)?;
    let p = persona.seizure_rate * by_phase(&config.seizure_phase_multiplier, state.phase);
    if !dice.chance(p) {
        return None;
    }
    let (lo, hi) = config.seizure_fraction;
    let wanted = (input as f64 * dice.uniform(lo, hi)).floor() as u64;
    let seized = state.drain(Currency::Db, wanted);
    Some(Seizure {
        persona: persona.label.clone(),
        seized,
        remaining: state.db,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::rng::RandDice;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_conversion_identities(x in 1u64..1_000_000, rate in 1u64..50) {
            let config = MarketConfig::default();
            let mut state = GameState::new();
            state.credit(Currency::Eu, x);
            match convert(&config, &mut state, Currency::Eu, x, rate, &mut RandDice::seeded(7)) {
                Ok(c) => {
                    let r = c.receipt.unwrap();
                    prop_assert_eq!(r.gained, x / rate);
                    prop_assert_eq!(r.spent, r.gained * rate);
                    prop_assert!(r.remainder < rate);
                    prop_assert_eq!(r.spent + r.remainder, x);
                    prop_assert_eq!(state.eu, r.remainder);
                }
                Err(e) => {
                    prop_assert_eq!(e, Rejection::ZeroOutput { rate, available: x });
                    prop_assert!(x < rate);
                }
            }
        }

        #[test]
        fn prop_conversion_never_creates_currency(
            x in 1u64..1_000_000,
            phase in 1u8..=6,
            seed in any::<u64>(),
            leg in 0usize..4,
        ) {
            let config = MarketConfig::default();
            let from = Currency::chain()[leg];
            let mut state = GameState::new();
            state.phase = phase;
            state.credit(from, x);
            let mut dice = RandDice::seeded(seed);
            let market = Market::new(&config, 0.0);
            let rate = market.rate(from).unwrap();
            if let Ok(Conversion { receipt: Some(r), .. }) =
                convert(&config, &mut state, from, x, rate, &mut dice)
            {
                prop_assert!(r.delivered * r.rate <= r.spent);
            }
        }

        #[test]
        fn prop_whole_discount_lowers_rate_exactly(t in 0u64..10_000, noise in -1.0f64..1.0, d in 1u32..4) {
            for pair in MarketConfig::default().pairs {
                let plain = dynamic_rate(&pair, t, noise * pair.noise, 0.0);
                let cut = dynamic_rate(&pair, t, noise * pair.noise, d as f64);
                prop_assert_eq!(cut, plain.saturating_sub(d as u64).max(1));
            }
        }

        #[test]
        fn prop_rates_stay_in_band(t in 0u64..10_000, noise in -1.0f64..1.0) {
            for pair in MarketConfig::default().pairs {
                let r = dynamic_rate(&pair, t, noise * pair.noise, 0.0) as f64;
                prop_assert!(r >= pair.min.round() && r <= pair.max.round());
            }
        }
    }
}
