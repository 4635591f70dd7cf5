//! Game state definitions.
//!
//! `GameState` is a flat keyed record: every field serializes to one top-level
//! key. Keys beginning with [`TRANSIENT_PREFIX`] hold session-only data and are
//! stripped before a snapshot is written (see `save.rs`).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key prefix reserved for fields that are never persisted.
pub const TRANSIENT_PREFIX: char = '_';

/// The five chained currencies plus the prestige currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Eu,
    St,
    Cc,
    Db,
    Tk,
    /// Protocol points, earned only by ascension.
    Pp,
}

impl Currency {
    /// The conversion chain in order. `Pp` is not part of it.
    pub fn chain() -> &'static [Currency] {
        &[
            Currency::Eu,
            Currency::St,
            Currency::Cc,
            Currency::Db,
            Currency::Tk,
        ]
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eu => "EU",
            Currency::St => "ST",
            Currency::Cc => "CC",
            Currency::Db => "DB",
            Currency::Tk => "TK",
            Currency::Pp => "PP",
        }
    }

    /// The currency this one converts into, if any.
    pub fn next(&self) -> Option<Currency> {
        match self {
            Currency::Eu => Some(Currency::St),
            Currency::St => Some(Currency::Cc),
            Currency::Cc => Some(Currency::Db),
            Currency::Db => Some(Currency::Tk),
            Currency::Tk | Currency::Pp => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Copy-out view of every balance, carried by `Tick` events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub eu: u64,
    pub st: u64,
    pub cc: u64,
    pub db: u64,
    pub tk: u64,
    pub pp: u64,
}

impl Balances {
    pub fn get(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Eu => self.eu,
            Currency::St => self.st,
            Currency::Cc => self.cc,
            Currency::Db => self.db,
            Currency::Tk => self.tk,
            Currency::Pp => self.pp,
        }
    }
}

/// What a timed buff does while it is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum BuffKind {
    /// Multiplies the aggregate production rate.
    RateMultiplier(f64),
    /// Multiplies the gross click value.
    ClickMultiplier(f64),
    /// Suppresses tax and escrow.
    Holiday,
    /// Clicks yield nothing.
    ClickFreeze,
}

/// A buff with an absolute expiry on the engine clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedBuff {
    pub kind: BuffKind,
    pub label: String,
    pub expires_at_ms: u64,
}

impl TimedBuff {
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// Click yield held back by an audit, credited on the first tick at or after
/// `release_at_ms`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowHold {
    pub amount: u64,
    pub release_at_ms: u64,
}

/// An award waiting on screen to be collected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAward {
    pub spawned_at_ms: u64,
    pub expires_at_ms: u64,
}

/// Full state of one profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub eu: u64,
    pub st: u64,
    pub cc: u64,
    pub db: u64,
    pub tk: u64,
    pub lifetime_eu: u64,
    pub lifetime_st: u64,
    pub lifetime_cc: u64,
    pub lifetime_db: u64,
    pub lifetime_tk: u64,

    /// Unspent protocol points.
    pub protocol_points: u64,
    /// Every protocol point ever banked. Never decreases.
    pub banked_points: u64,
    pub ascensions: u32,
    pub permanent_multiplier: f64,

    /// Owned production units by tier id.
    pub buildings: BTreeMap<String, u32>,
    /// Run upgrade levels by id.
    pub upgrades: BTreeMap<String, u32>,
    /// Permanent upgrade levels by id. Survive ascension.
    pub permanent_upgrades: BTreeMap<String, u32>,

    pub phase: u8,
    pub total_clicks: u64,
    /// Awards collected this run.
    pub collectibles: u32,
    /// Milestone keys already fired this run.
    pub milestones: BTreeSet<String>,
    /// Timestamp of the very first session; seeds the crown persona.
    pub first_session_ms: u64,

    #[serde(rename = "_carry")]
    pub carry: f64,
    #[serde(rename = "_buffs")]
    pub buffs: Vec<TimedBuff>,
    #[serde(rename = "_escrow")]
    pub escrow: Vec<EscrowHold>,
    #[serde(rename = "_session_clicks")]
    pub session_clicks: u64,
    #[serde(rename = "_click_times")]
    pub click_times: VecDeque<u64>,
    #[serde(rename = "_last_input_ms")]
    pub last_input_ms: u64,
    #[serde(rename = "_idle_reported")]
    pub idle_reported: bool,
    #[serde(rename = "_award")]
    pub award: Option<PendingAward>,
    #[serde(rename = "_next_award_ms")]
    pub next_award_ms: Option<u64>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            eu: 0,
            st: 0,
            cc: 0,
            db: 0,
            tk: 0,
            lifetime_eu: 0,
            lifetime_st: 0,
            lifetime_cc: 0,
            lifetime_db: 0,
            lifetime_tk: 0,
            protocol_points: 0,
            banked_points: 0,
            ascensions: 0,
            permanent_multiplier: 1.0,
            buildings: BTreeMap::new(),
            upgrades: BTreeMap::new(),
            permanent_upgrades: BTreeMap::new(),
            phase: 1,
            total_clicks: 0,
            collectibles: 0,
            milestones: BTreeSet::new(),
            first_session_ms: 0,
            carry: 0.0,
            buffs: Vec::new(),
            escrow: Vec::new(),
            session_clicks: 0,
            click_times: VecDeque::new(),
            last_input_ms: 0,
            idle_reported: false,
            award: None,
            next_award_ms: None,
        }
    }
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Eu => self.eu,
            Currency::St => self.st,
            Currency::Cc => self.cc,
            Currency::Db => self.db,
            Currency::Tk => self.tk,
            Currency::Pp => self.protocol_points,
        }
    }

    fn balance_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Eu => &mut self.eu,
            Currency::St => &mut self.st,
            Currency::Cc => &mut self.cc,
            Currency::Db => &mut self.db,
            Currency::Tk => &mut self.tk,
            Currency::Pp => &mut self.protocol_points,
        }
    }

    /// Lifetime earnings. Protocol points report `banked_points`.
    pub fn lifetime(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Eu => self.lifetime_eu,
            Currency::St => self.lifetime_st,
            Currency::Cc => self.lifetime_cc,
            Currency::Db => self.lifetime_db,
            Currency::Tk => self.lifetime_tk,
            Currency::Pp => self.banked_points,
        }
    }

    fn lifetime_mut(&mut self, currency: Currency) -> Option<&mut u64> {
        match currency {
            Currency::Eu => Some(&mut self.lifetime_eu),
            Currency::St => Some(&mut self.lifetime_st),
            Currency::Cc => Some(&mut self.lifetime_cc),
            Currency::Db => Some(&mut self.lifetime_db),
            Currency::Tk => Some(&mut self.lifetime_tk),
            Currency::Pp => None,
        }
    }

    /// Add earned currency to the balance and its lifetime counter.
    pub fn credit(&mut self, currency: Currency, amount: u64) {
        let balance = self.balance_mut(currency);
        *balance = balance.saturating_add(amount);
        if let Some(lifetime) = self.lifetime_mut(currency) {
            *lifetime = lifetime.saturating_add(amount);
        }
    }

    /// Add currency to the balance only (start-of-run grants).
    pub fn grant(&mut self, currency: Currency, amount: u64) {
        let balance = self.balance_mut(currency);
        *balance = balance.saturating_add(amount);
    }

    /// Remove `amount` if the balance covers it. Returns false and leaves the
    /// balance untouched otherwise.
    pub fn debit(&mut self, currency: Currency, amount: u64) -> bool {
        let balance = self.balance_mut(currency);
        if *balance < amount {
            return false;
        }
        *balance -= amount;
        true
    }

    /// Remove up to `amount`, stopping at zero. Returns what was removed.
    pub fn drain(&mut self, currency: Currency, amount: u64) -> u64 {
        let balance = self.balance_mut(currency);
        let taken = amount.min(*balance);
        *balance -= taken;
        taken
    }

    pub fn balances(&self) -> Balances {
        Balances {
            eu: self.eu,
            st: self.st,
            cc: self.cc,
            db: self.db,
            tk: self.tk,
            pp: self.protocol_points,
        }
    }

    pub fn owned(&self, tier_id: &str) -> u32 {
        self.buildings.get(tier_id).copied().unwrap_or(0)
    }

    /// Units owned across every tier.
    pub fn total_units(&self) -> u64 {
        self.buildings.values().map(|&c| c as u64).sum()
    }

    pub fn upgrade_level(&self, id: &str) -> u32 {
        self.upgrades.get(id).copied().unwrap_or(0)
    }

    pub fn permanent_level(&self, id: &str) -> u32 {
        self.permanent_upgrades.get(id).copied().unwrap_or(0)
    }

    /// Product of all active click multipliers.
    pub fn click_multiplier(&self, now_ms: u64) -> f64 {
        self.active_buffs(now_ms)
            .filter_map(|b| match b.kind {
                BuffKind::ClickMultiplier(m) => Some(m),
                _ => None,
            })
            .product()
    }

    /// Product of all active production multipliers.
    pub fn rate_multiplier(&self, now_ms: u64) -> f64 {
        self.active_buffs(now_ms)
            .filter_map(|b| match b.kind {
                BuffKind::RateMultiplier(m) => Some(m),
                _ => None,
            })
            .product()
    }

    pub fn holiday_active(&self, now_ms: u64) -> bool {
        self.active_buffs(now_ms)
            .any(|b| b.kind == BuffKind::Holiday)
    }

    pub fn clicks_frozen(&self, now_ms: u64) -> bool {
        self.active_buffs(now_ms)
            .any(|b| b.kind == BuffKind::ClickFreeze)
    }

    fn active_buffs(&self, now_ms: u64) -> impl Iterator<Item = &TimedBuff> {
        self.buffs.iter().filter(move |b| b.is_active(now_ms))
    }

    /// Drop expired buffs, returning them.
    pub fn take_expired_buffs(&mut self, now_ms: u64) -> Vec<TimedBuff> {
        let (active, expired): (Vec<_>, Vec<_>) = std::mem::take(&mut self.buffs)
            .into_iter()
            .partition(|b| b.is_active(now_ms));
        self.buffs = active;
        expired
    }

    /// Drop escrow holds that are due, returning them.
    pub fn take_due_escrow(&mut self, now_ms: u64) -> Vec<EscrowHold> {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.escrow)
            .into_iter()
            .partition(|h| h.release_at_ms <= now_ms);
        self.escrow = waiting;
        due
    }
}

/// A partial update for [`crate::store::StateStore::set_state`]. Only the keys
/// that are `Some` are merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatePatch {
    pub balances: BTreeMap<Currency, u64>,
    pub total_clicks: Option<u64>,
    pub phase: Option<u8>,
    pub buildings: Option<BTreeMap<String, u32>>,
    pub upgrades: Option<BTreeMap<String, u32>>,
    pub permanent_upgrades: Option<BTreeMap<String, u32>>,
    pub collectibles: Option<u32>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(mut self, currency: Currency, amount: u64) -> Self {
        self.balances.insert(currency, amount);
        self
    }

    pub fn total_clicks(mut self, clicks: u64) -> Self {
        self.total_clicks = Some(clicks);
        self
    }

    pub fn phase(mut self, phase: u8) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn building(mut self, tier_id: &str, count: u32) -> Self {
        self.buildings
            .get_or_insert_with(BTreeMap::new)
            .insert(tier_id.to_string(), count);
        self
    }

    pub fn upgrade(mut self, id: &str, level: u32) -> Self {
        self.upgrades
            .get_or_insert_with(BTreeMap::new)
            .insert(id.to_string(), level);
        self
    }

    pub fn permanent_upgrade(mut self, id: &str, level: u32) -> Self {
        self.permanent_upgrades
            .get_or_insert_with(BTreeMap::new)
            .insert(id.to_string(), level);
        self
    }

    pub fn collectibles(mut self, count: u32) -> Self {
        self.collectibles = Some(count);
        self
    }

    /// Merge into `state`. Maps are merged key by key; scalars replace.
    pub fn apply(self, state: &mut GameState) {
        for (currency, amount) in self.balances {
            *state.balance_mut(currency) = amount;
        }
        if let Some(clicks) = self.total_clicks {
            state.total_clicks = clicks;
        }
        if let Some(phase) = self.phase {
            state.phase = phase;
        }
        if let Some(buildings) = self.buildings {
            state.buildings.extend(buildings);
        }
        if let Some(upgrades) = self.upgrades {
            state.upgrades.extend(upgrades);
        }
        if let Some(levels) = self.permanent_upgrades {
            state.permanent_upgrades.extend(levels);
        }
        if let Some(count) = self.collectibles {
            state.collectibles = count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buff(kind: BuffKind, expires_at_ms: u64) -> TimedBuff {
        TimedBuff {
            kind,
            label: "test".into(),
            expires_at_ms,
        }
    }

    #[test]
    fn credit_tracks_lifetime() {
        let mut state = GameState::new();
        state.credit(Currency::St, 40);
        assert_eq!(state.st, 40);
        assert_eq!(state.lifetime_st, 40);
        assert!(state.debit(Currency::St, 15));
        assert_eq!(state.st, 25);
        assert_eq!(state.lifetime_st, 40);
    }

    #[test]
    fn debit_refuses_overdraft() {
        let mut state = GameState::new();
        state.credit(Currency::Eu, 10);
        assert!(!state.debit(Currency::Eu, 11));
        assert_eq!(state.eu, 10);
    }

    #[test]
    fn grant_skips_lifetime() {
        let mut state = GameState::new();
        state.grant(Currency::Eu, 500);
        assert_eq!(state.eu, 500);
        assert_eq!(state.lifetime_eu, 0);
    }

    #[test]
    fn drain_stops_at_zero() {
        let mut state = GameState::new();
        state.credit(Currency::Db, 7);
        assert_eq!(state.drain(Currency::Db, 10), 7);
        assert_eq!(state.db, 0);
    }

    #[test]
    fn chain_order() {
        let chain = Currency::chain();
        for pair in chain.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert_eq!(Currency::Tk.next(), None);
        assert_eq!(Currency::Pp.next(), None);
    }

    #[test]
    fn buff_multipliers_stack() {
        let mut state = GameState::new();
        state.buffs.push(buff(BuffKind::ClickMultiplier(3.0), 1_000));
        state.buffs.push(buff(BuffKind::ClickMultiplier(2.0), 2_000));
        state.buffs.push(buff(BuffKind::RateMultiplier(0.5), 1_000));
        assert!((state.click_multiplier(0) - 6.0).abs() < 1e-9);
        assert!((state.click_multiplier(1_500) - 2.0).abs() < 1e-9);
        assert!((state.rate_multiplier(999) - 0.5).abs() < 1e-9);
        assert!((state.rate_multiplier(1_000) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn expired_buffs_are_taken() {
        let mut state = GameState::new();
        state.buffs.push(buff(BuffKind::Holiday, 500));
        state.buffs.push(buff(BuffKind::ClickFreeze, 5_000));
        assert!(state.holiday_active(100));
        let expired = state.take_expired_buffs(500);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kind, BuffKind::Holiday);
        assert!(state.clicks_frozen(500));
    }

    #[test]
    fn due_escrow_is_taken() {
        let mut state = GameState::new();
        state.escrow.push(EscrowHold {
            amount: 5,
            release_at_ms: 10_000,
        });
        state.escrow.push(EscrowHold {
            amount: 9,
            release_at_ms: 12_000,
        });
        assert!(state.take_due_escrow(9_999).is_empty());
        let due = state.take_due_escrow(10_000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].amount, 5);
        assert_eq!(state.escrow.len(), 1);
    }

    #[test]
    fn patch_merges_only_present_keys() {
        let mut state = GameState::new();
        state.buildings.insert("intern".into(), 3);
        state.total_clicks = 12;

        StatePatch::new()
            .balance(Currency::Cc, 99)
            .building("clerk", 2)
            .apply(&mut state);

        assert_eq!(state.cc, 99);
        assert_eq!(state.owned("intern"), 3);
        assert_eq!(state.owned("clerk"), 2);
        assert_eq!(state.total_clicks, 12);
    }

    #[test]
    fn total_units_sums_tiers() {
        let mut state = GameState::new();
        state.buildings.insert("intern".into(), 60);
        state.buildings.insert("clerk".into(), 45);
        assert_eq!(state.total_units(), 105);
    }
}
