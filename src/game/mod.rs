pub mod crash_model;
pub mod engine;
pub mod gateway;
pub mod history;
pub mod ledger;
pub mod scheduler;
pub mod timer;
pub mod types;

pub use crash_model::{CrashModel, HazardCrashModel, PresampledCrashModel};
pub use engine::{spawn_engine, spawn_engine_with_model, EngineHandle};
pub use gateway::{BroadcastGateway, ChannelGateway, RecordingGateway};
pub use history::RoundHistory;
pub use ledger::PlayerLedger;
pub use scheduler::RoundScheduler;
pub use types::*;
