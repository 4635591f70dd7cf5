//! Crown Clicker: the economy engine of a single-player idle game.
//!
//! Clicks and passive production mint Expense Units, which climb a one-way
//! currency chain (EU → ST → CC → DB → TK) through a jittery market with
//! bust losses, crown seizures and a processing fee. Ascension banks
//! protocol points for permanent upgrades.
//!
//! The host owns rendering. It drives [`Engine`] with clicks, purchases and
//! `advance(elapsed_ms)`, and listens to [`GameEvent`]s.

pub mod awards;
pub mod click;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod market;
pub mod phase;
pub mod prestige;
pub mod production;
pub mod rng;
pub mod save;
pub mod state;
pub mod store;
pub mod time;
pub mod upgrades;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{ConfigError, PersistError, Rejection};
pub use event::{EventKind, GameEvent, ListenerId};
pub use state::{Currency, GameState, StatePatch};
