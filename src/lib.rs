//! Liftoff - multiplayer crash game round engine
//!
//! Players register, stake part of their balance during a countdown, then
//! watch a shared multiplier climb until it crashes. Anyone who cashed out
//! before the crash is paid `bet * multiplier`; everyone else loses the stake.
//!
//! The [`game`] module holds the engine: a single task owns all round state
//! and processes commands and timer firings one at a time. The [`api`]
//! module fronts it with axum over HTTP and WebSocket.

pub mod api;
pub mod config;
pub mod errors;
pub mod game;
pub mod metrics;

pub use config::LiftoffConfig;
pub use errors::{ConfigError, EngineError, EngineResult};
pub use game::{spawn_engine, EngineHandle, GameEvent, GameSnapshot, Multiplier, Phase, PlayerId};
