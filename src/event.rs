//! Typed events and a synchronous publish/subscribe bus.
//!
//! Events are the only way collaborators (renderers, audio, narrative text)
//! learn about state transitions. Each event says *what* changed and carries
//! the exact amounts, so subscribers never need to diff state.
//!
//! Delivery is synchronous and in registration order. Every listener call is
//! isolated: a listener that panics is logged, unsubscribed, and the event
//! still reaches everyone registered after it.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::awards::AwardEffect;
use crate::click::ClickValue;
use crate::error::Rejection;
use crate::state::{Balances, Currency, GameState};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Generic "something changed" notification with the full state.
    StateChange { state: Box<GameState> },
    Click {
        total_clicks: u64,
        session_clicks: u64,
        value: ClickValue,
    },
    Tick {
        balances: Balances,
        phase: u8,
        rate: f64,
    },
    BuildingPurchased {
        tier: String,
        bought: u32,
        owned: u32,
        cost: u64,
    },
    BuildingMilestone {
        tier: Option<String>,
        threshold: u64,
        headline: String,
    },
    UpgradePurchased { id: String, level: u32, cost: u64 },
    PurchaseFailed { what: String, reason: Rejection },
    GcaSpawned { expires_at_ms: u64 },
    GcaDismissed,
    GcaCollected { is_wrath: bool, effect: AwardEffect },
    Conversion {
        from: Currency,
        to: Currency,
        rate: u64,
        spent: u64,
        remainder: u64,
        gained: u64,
        lost: u64,
        fee: u64,
        delivered: u64,
    },
    ConversionFailed {
        from: Currency,
        to: Currency,
        rate: u64,
        available: u64,
    },
    Busted {
        from: Currency,
        to: Currency,
        lost: u64,
        remaining: u64,
    },
    CrownSeizure {
        persona: String,
        seized: u64,
        remaining: u64,
    },
    PhaseChange { from: u8, to: u8 },
    Ascension {
        count: u32,
        points_earned: u64,
        total_points: u64,
    },
    PrestigeUpgrade { id: String, level: u32, cost: u64 },
    RapidInput { span_ms: u64 },
    Idle { idle_ms: u64 },
    EscrowReleased { amount: u64 },
    BuffExpired { label: String },
    Saved { bytes: usize },
    PersistFailed { reason: String },
}

/// Discriminant tag used to subscribe to one kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChange,
    Click,
    Tick,
    BuildingPurchased,
    BuildingMilestone,
    UpgradePurchased,
    PurchaseFailed,
    GcaSpawned,
    GcaDismissed,
    GcaCollected,
    Conversion,
    ConversionFailed,
    Busted,
    CrownSeizure,
    PhaseChange,
    Ascension,
    PrestigeUpgrade,
    RapidInput,
    Idle,
    EscrowReleased,
    BuffExpired,
    Saved,
    PersistFailed,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::StateChange { .. } => EventKind::StateChange,
            GameEvent::Click { .. } => EventKind::Click,
            GameEvent::Tick { .. } => EventKind::Tick,
            GameEvent::BuildingPurchased { .. } => EventKind::BuildingPurchased,
            GameEvent::BuildingMilestone { .. } => EventKind::BuildingMilestone,
            GameEvent::UpgradePurchased { .. } => EventKind::UpgradePurchased,
            GameEvent::PurchaseFailed { .. } => EventKind::PurchaseFailed,
            GameEvent::GcaSpawned { .. } => EventKind::GcaSpawned,
            GameEvent::GcaDismissed => EventKind::GcaDismissed,
            GameEvent::GcaCollected { .. } => EventKind::GcaCollected,
            GameEvent::Conversion { .. } => EventKind::Conversion,
            GameEvent::ConversionFailed { .. } => EventKind::ConversionFailed,
            GameEvent::Busted { .. } => EventKind::Busted,
            GameEvent::CrownSeizure { .. } => EventKind::CrownSeizure,
            GameEvent::PhaseChange { .. } => EventKind::PhaseChange,
            GameEvent::Ascension { .. } => EventKind::Ascension,
            GameEvent::PrestigeUpgrade { .. } => EventKind::PrestigeUpgrade,
            GameEvent::RapidInput { .. } => EventKind::RapidInput,
            GameEvent::Idle { .. } => EventKind::Idle,
            GameEvent::EscrowReleased { .. } => EventKind::EscrowReleased,
            GameEvent::BuffExpired { .. } => EventKind::BuffExpired,
            GameEvent::Saved { .. } => EventKind::Saved,
            GameEvent::PersistFailed { .. } => EventKind::PersistFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A read-only event consumer.
pub type Listener = Box<dyn FnMut(&GameEvent)>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription {
    id: ListenerId,
    /// `None` receives every event.
    kind: Option<EventKind>,
    listener: Listener,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    emitted: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.subscriptions.len())
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event.
    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.subscribe(Some(kind), listener)
    }

    /// Subscribe to every event.
    pub fn on_any(&mut self, listener: Listener) -> ListenerId {
        self.subscribe(None, listener)
    }

    fn subscribe(&mut self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, kind, listener });
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Total events emitted since creation.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Deliver `event` to every matching listener, in registration order.
    pub fn emit(&mut self, event: GameEvent) {
        self.emitted += 1;
        let kind = event.kind();
        let mut failed = Vec::new();

        for sub in &mut self.subscriptions {
            if sub.kind.is_some_and(|k| k != kind) {
                continue;
            }
            let listener = &mut sub.listener;
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if outcome.is_err() {
                warn!(?kind, listener = sub.id.0, "event listener panicked; unsubscribing");
                failed.push(sub.id);
            }
        }

        if !failed.is_empty() {
            self.subscriptions.retain(|s| !failed.contains(&s.id));
        }
    }
}
