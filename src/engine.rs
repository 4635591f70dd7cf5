//! The owning controller.
//!
//! `Engine` holds the store, the clock, the live market and the dice. Every
//! mutating entry point validates, applies through the core modules, and then
//! publishes what happened. Refusals come back as `Err(Rejection)` with a
//! matching `*Failed` event already emitted.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::awards::{self, AwardTick, Collected};
use crate::click::{self, ClickValue};
use crate::config::{EngineConfig, PersonaConfig};
use crate::error::{PersistError, Rejection};
use crate::event::{EventKind, GameEvent, Listener, ListenerId};
use crate::market::{self, Conversion, Market, Trend};
use crate::prestige::{self, Ascension, Perks, PermanentPurchase};
use crate::production::{self, Purchase};
use crate::rng::{Dice, RandDice};
use crate::save::{self, Storage};
use crate::state::{Balances, Currency, GameState, PendingAward, StatePatch};
use crate::store::StateStore;
use crate::time::{wall_clock_ms, GameTime};
use crate::upgrades::{self, UpgradePurchase};

pub struct Engine {
    store: StateStore,
    config: EngineConfig,
    time: GameTime,
    market: Market,
    dice: Box<dyn Dice>,
    storage: Option<Box<dyn Storage>>,
    last_save_ms: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("now_ms", &self.time.now_ms())
            .field("market", &self.market)
            .field("persistent", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start from `state` with no storage attached. `now_ms` is the clock
    /// reading at tick 0.
    pub fn new(config: EngineConfig, state: GameState, dice: Box<dyn Dice>, now_ms: u64) -> Self {
        let mut state = state;
        if state.first_session_ms == 0 {
            state.first_session_ms = now_ms;
        }
        state.last_input_ms = now_ms;
        prestige::refresh_multiplier(&config, &mut state);

        let discount = Perks::from_state(&config.permanent_upgrades, &state).conversion_discount;
        let market = Market::new(&config.market, discount);
        let time = GameTime::new(
            config.timing.tick_ms,
            config.timing.max_catch_up_ms,
            now_ms,
        );

        Self {
            store: StateStore::new(state),
            config,
            time,
            market,
            dice,
            storage: None,
            last_save_ms: now_ms,
        }
    }

    /// Load from `storage` (or start fresh when it is empty or unreadable)
    /// and keep it for autosave.
    pub fn with_storage(
        config: EngineConfig,
        mut storage: Box<dyn Storage>,
        dice: Box<dyn Dice>,
        now_ms: u64,
    ) -> Self {
        let state = match save::load(storage.as_mut()) {
            Ok(Some(state)) => {
                info!(ascensions = state.ascensions, "restored saved profile");
                state
            }
            Ok(None) => GameState::new(),
            Err(e) => {
                warn!(error = %e, "starting a fresh profile");
                GameState::new()
            }
        };
        let mut engine = Self::new(config, state, dice, now_ms);
        engine.storage = Some(storage);
        engine
    }

    /// Host entry: wall-clock origin and entropy-seeded dice.
    pub fn boot(config: EngineConfig, storage: Box<dyn Storage>) -> Self {
        let now_ms = wall_clock_ms();
        let dice = Box::new(RandDice::seeded(now_ms ^ 0x9e37_79b9_7f4a_7c15));
        Self::with_storage(config, storage, dice, now_ms)
    }

    // ── Subscriptions ───────────────────────────────────────────

    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.store.on(kind, listener)
    }

    pub fn on_any(&mut self, listener: Listener) -> ListenerId {
        self.store.on_any(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.store.off(id)
    }

    // ── Mutating entry points ───────────────────────────────────

    pub fn perform_click(&mut self) -> ClickValue {
        let now = self.time.now_ms();
        let rate = self.aggregate_rate();
        let outcome = click::perform_click(
            &self.config,
            self.store.state_mut(),
            rate,
            now,
            self.dice.as_mut(),
        );
        let state = self.store.get_state();
        debug!(
            clicks = state.total_clicks,
            gross = outcome.value.gross,
            net = outcome.value.net,
            escrowed = outcome.value.escrowed,
            "click"
        );

        let mut events = vec![GameEvent::Click {
            total_clicks: state.total_clicks,
            session_clicks: state.session_clicks,
            value: outcome.value,
        }];
        if let Some(span_ms) = outcome.rapid_span_ms {
            events.push(GameEvent::RapidInput { span_ms });
        }
        if let Some((from, to)) = outcome.phase_change {
            info!(from, to, "phase changed");
            events.push(GameEvent::PhaseChange { from, to });
        }
        self.store.emit_all(events);

        if outcome.save_due {
            let _ = self.save();
        }
        outcome.value
    }

    pub fn purchase_tier(&mut self, tier_id: &str, count: u32) -> Result<Purchase, Rejection> {
        match production::buy(&self.config, self.store.state_mut(), tier_id, count) {
            Ok(purchase) => {
                debug!(tier = tier_id, count, cost = purchase.cost, "bought units");
                let mut events = vec![GameEvent::BuildingPurchased {
                    tier: purchase.tier.clone(),
                    bought: purchase.bought,
                    owned: purchase.owned,
                    cost: purchase.cost,
                }];
                events.extend(purchase.milestones.iter().map(|m| {
                    GameEvent::BuildingMilestone {
                        tier: m.tier.clone(),
                        threshold: m.threshold,
                        headline: m.headline.clone(),
                    }
                }));
                self.store.emit_all(events);
                Ok(purchase)
            }
            Err(reason) => Err(self.refuse(tier_id, reason)),
        }
    }

    pub fn purchase_upgrade(&mut self, id: &str) -> Result<UpgradePurchase, Rejection> {
        match upgrades::buy_upgrade(&self.config, self.store.state_mut(), id) {
            Ok(purchase) => {
                debug!(id, level = purchase.level, cost = purchase.cost, "bought upgrade");
                self.store.emit(GameEvent::UpgradePurchased {
                    id: purchase.id.clone(),
                    level: purchase.level,
                    cost: purchase.cost,
                });
                Ok(purchase)
            }
            Err(reason) => Err(self.refuse(id, reason)),
        }
    }

    /// Convert `amount` of `from` into the next currency in the chain at the
    /// current market rate.
    pub fn convert(&mut self, from: Currency, amount: u64) -> Result<Conversion, Rejection> {
        let (Some(to), Some(rate)) = (from.next(), self.market.rate(from)) else {
            return Err(self.refuse(from.code(), Rejection::UnknownId(from.code().to_string())));
        };

        let result = market::convert(
            &self.config.market,
            self.store.state_mut(),
            from,
            amount,
            rate,
            self.dice.as_mut(),
        );
        let conversion = match result {
            Ok(conversion) => conversion,
            Err(reason) => {
                let available = self.store.get_state().balance(from);
                self.store.emit(GameEvent::ConversionFailed {
                    from,
                    to,
                    rate,
                    available,
                });
                return Err(reason);
            }
        };

        let mut events = Vec::new();
        if let Some(s) = &conversion.seizure {
            info!(persona = %s.persona, seized = s.seized, "crown seizure");
            events.push(GameEvent::CrownSeizure {
                persona: s.persona.clone(),
                seized: s.seized,
                remaining: s.remaining,
            });
        }

        let Some(r) = &conversion.receipt else {
            // The seizure stands even though nothing was left to convert.
            let available = self.store.get_state().balance(from);
            events.push(GameEvent::ConversionFailed {
                from,
                to,
                rate,
                available,
            });
            self.store.emit_all(events);
            return Err(Rejection::ZeroOutput { rate, available });
        };

        debug!(%from, %to, rate, spent = r.spent, delivered = r.delivered, "converted");
        if r.lost > 0 {
            events.push(GameEvent::Busted {
                from,
                to,
                lost: r.lost,
                remaining: r.gained - r.lost,
            });
        }
        events.push(GameEvent::Conversion {
            from: r.from,
            to: r.to,
            rate: r.rate,
            spent: r.spent,
            remainder: r.remainder,
            gained: r.gained,
            lost: r.lost,
            fee: r.fee,
            delivered: r.delivered,
        });
        self.store.emit_all(events);
        Ok(conversion)
    }

    pub fn ascend(&mut self) -> Result<Ascension, Rejection> {
        match prestige::ascend(&self.config, self.store.state_mut()) {
            Ok(ascension) => {
                self.store.emit(GameEvent::Ascension {
                    count: ascension.count,
                    points_earned: ascension.points_earned,
                    total_points: ascension.total_points,
                });
                self.store.emit_state_change();
                Ok(ascension)
            }
            Err(reason) => Err(self.refuse("ascension", reason)),
        }
    }

    pub fn purchase_permanent_upgrade(&mut self, id: &str) -> Result<PermanentPurchase, Rejection> {
        match prestige::buy_permanent(&self.config, self.store.state_mut(), id) {
            Ok(purchase) => {
                info!(id, level = purchase.level, cost = purchase.cost, "bought permanent upgrade");
                self.store.emit(GameEvent::PrestigeUpgrade {
                    id: purchase.id.clone(),
                    level: purchase.level,
                    cost: purchase.cost,
                });
                Ok(purchase)
            }
            Err(reason) => Err(self.refuse(id, reason)),
        }
    }

    pub fn collect_award(&mut self) -> Result<Collected, Rejection> {
        let now = self.time.now_ms();
        let rate = self.aggregate_rate();
        let result = awards::collect(
            &self.config.awards,
            self.store.state_mut(),
            rate,
            now,
            self.dice.as_mut(),
        );
        match result {
            Ok(collected) => {
                debug!(effect = collected.effect.name(), wrath = collected.is_wrath, "award collected");
                self.store.emit(GameEvent::GcaCollected {
                    is_wrath: collected.is_wrath,
                    effect: collected.effect.clone(),
                });
                Ok(collected)
            }
            Err(reason) => Err(self.refuse("award", reason)),
        }
    }

    /// Merge `patch` into the state. Never rejects.
    pub fn set_state(&mut self, patch: StatePatch) {
        self.store.set_state(patch);
    }

    /// Feed elapsed wall-clock time. Runs every tick that became due and
    /// returns how many ran.
    pub fn advance(&mut self, elapsed_ms: u64) -> usize {
        let due = self.time.advance(elapsed_ms);
        for &at in &due {
            self.run_tick(at);
        }
        due.len()
    }

    /// Write a snapshot. Without storage this is a no-op that reports zero
    /// bytes. Failures are logged and published, never fatal.
    pub fn save(&mut self) -> Result<usize, PersistError> {
        self.last_save_ms = self.time.now_ms();
        let Some(storage) = self.storage.as_mut() else {
            return Ok(0);
        };
        match save::save(storage.as_mut(), self.store.get_state()) {
            Ok(bytes) => {
                debug!(bytes, "saved");
                self.store.emit(GameEvent::Saved { bytes });
                Ok(bytes)
            }
            Err(e) => {
                warn!(error = %e, "save failed; continuing in memory");
                self.store.emit(GameEvent::PersistFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Final save before the host goes away.
    pub fn shutdown(&mut self) -> Result<usize, PersistError> {
        info!(clicks = self.store.get_state().total_clicks, "shutting down");
        self.save()
    }

    // ── Tick ────────────────────────────────────────────────────

    fn run_tick(&mut self, at: u64) {
        let mut events = Vec::new();
        let discount = self.perks().conversion_discount;
        let state = self.store.state_mut();

        for hold in state.take_due_escrow(at) {
            state.credit(Currency::Eu, hold.amount);
            events.push(GameEvent::EscrowReleased {
                amount: hold.amount,
            });
        }
        for buff in state.take_expired_buffs(at) {
            events.push(GameEvent::BuffExpired { label: buff.label });
        }

        let step_ms = self.config.timing.tick_ms;
        let rate = production::aggregate_rate(&self.config, state, at);
        production::tick(state, rate, step_ms);
        self.market
            .update(&self.config.market, discount, step_ms, self.dice.as_mut());

        match awards::tick(&self.config.awards, state, rate, at, self.dice.as_mut()) {
            Some(AwardTick::Spawned { expires_at_ms }) => {
                debug!(expires_at_ms, "award spawned");
                events.push(GameEvent::GcaSpawned { expires_at_ms });
            }
            Some(AwardTick::Dismissed) => events.push(GameEvent::GcaDismissed),
            None => {}
        }

        let idle_ms = at.saturating_sub(state.last_input_ms);
        let idle_limit = self.config.click.idle_ms;
        if idle_limit > 0 && !state.idle_reported && idle_ms >= idle_limit {
            state.idle_reported = true;
            events.push(GameEvent::Idle { idle_ms });
        }

        events.push(GameEvent::Tick {
            balances: state.balances(),
            phase: state.phase,
            rate,
        });
        self.store.emit_all(events);

        let autosave = self.config.timing.autosave_ms;
        if autosave > 0 && at.saturating_sub(self.last_save_ms) >= autosave {
            let _ = self.save();
        }
    }

    fn refuse(&mut self, what: &str, reason: Rejection) -> Rejection {
        debug!(what, %reason, "refused");
        self.store.emit(GameEvent::PurchaseFailed {
            what: what.to_string(),
            reason: reason.clone(),
        });
        reason
    }

    fn perks(&self) -> Perks {
        Perks::from_state(&self.config.permanent_upgrades, self.store.get_state())
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn state(&self) -> &GameState {
        self.store.get_state()
    }

    pub fn snapshot(&self) -> GameState {
        self.store.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.time.now_ms()
    }

    pub fn balances(&self) -> Balances {
        self.state().balances()
    }

    /// EU cost of the next `count` units of a tier.
    pub fn purchase_cost(&self, tier_id: &str, count: u32) -> Option<u64> {
        let tier = self.config.tier(tier_id)?;
        Some(production::purchase_cost(
            tier,
            self.config.production.cost_growth,
            self.state().owned(tier_id),
            count,
            self.perks().cost_discount,
        ))
    }

    /// CC cost of the next level, `None` if unknown or maxed.
    pub fn upgrade_cost(&self, id: &str) -> Option<u64> {
        let up = self.config.upgrade(id)?;
        let level = self.state().upgrade_level(id);
        (level < up.max_level).then(|| upgrades::upgrade_cost(up, level))
    }

    /// PP cost of the next level, `None` if unknown or maxed.
    pub fn permanent_upgrade_cost(&self, id: &str) -> Option<u64> {
        let up = self.config.permanent_upgrade(id)?;
        let level = self.state().permanent_level(id);
        (level < up.max_level).then(|| prestige::permanent_cost(up, level))
    }

    pub fn aggregate_rate(&self) -> f64 {
        production::aggregate_rate(&self.config, self.state(), self.time.now_ms())
    }

    /// Current integer rate for the pair starting at `from`.
    pub fn rate(&self, from: Currency) -> Option<u64> {
        self.market.rate(from)
    }

    pub fn trend(&self, from: Currency) -> Trend {
        self.market.trend(from)
    }

    pub fn samples(&self, from: Currency) -> Vec<u64> {
        self.market.samples(from)
    }

    pub fn permanent_multiplier(&self) -> f64 {
        self.state().permanent_multiplier
    }

    pub fn phase(&self) -> u8 {
        self.state().phase
    }

    pub fn potential_points(&self) -> u64 {
        prestige::potential_points(&self.config.prestige, self.state().lifetime_eu)
    }

    pub fn new_points(&self) -> u64 {
        prestige::new_points(&self.config.prestige, self.state())
    }

    pub fn persona(&self) -> Option<&PersonaConfig> {
        market::persona(&self.config.market, self.state().first_session_ms)
    }

    pub fn pending_award(&self) -> Option<&PendingAward> {
        self.state().award.as_ref()
    }

    pub fn synthetic_history(&self, date: NaiveDate, from: Currency) -> Option<Vec<f64>> {
        let pair = self.config.pair(from)?;
        Some(market::synthetic_history(
            date,
            pair,
            self.config.market.synthetic_samples,
        ))
    }
}
