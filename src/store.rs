//! The single owner of `GameState` and the event bus.
//!
//! Collaborators get shared borrows or owned snapshots; mutation happens only
//! through `set_state` or through the engine's validated entry points.

use crate::event::{EventBus, EventKind, GameEvent, Listener, ListenerId};
use crate::state::{GameState, StatePatch};

#[derive(Debug, Default)]
pub struct StateStore {
    state: GameState,
    bus: EventBus,
}

impl StateStore {
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            bus: EventBus::new(),
        }
    }

    /// Live view of the aggregate.
    pub fn get_state(&self) -> &GameState {
        &self.state
    }

    /// Owned copy, safe to keep across mutations.
    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    /// Merge `patch` and announce it. Never rejects.
    pub fn set_state(&mut self, patch: StatePatch) {
        patch.apply(&mut self.state);
        self.emit_state_change();
    }

    pub fn emit_state_change(&mut self) {
        let state = Box::new(self.state.clone());
        self.bus.emit(GameEvent::StateChange { state });
    }

    pub fn on(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.bus.on(kind, listener)
    }

    pub fn on_any(&mut self, listener: Listener) -> ListenerId {
        self.bus.on_any(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.bus.off(id)
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.bus.emit(event);
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = GameEvent>) {
        for event in events {
            self.bus.emit(event);
        }
    }

    pub(crate) fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }
}
