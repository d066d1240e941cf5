pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod platform;
pub mod roll;
pub mod rules;
pub mod scheduler;
pub mod storage;

// Re-exports for the later usage in bots embedding the engine.
pub use crate::config::{GiveawayDefaults, LastChanceOptions, PauseState, ResolvedOptions};
pub use crate::error::{Error, Result};
pub use crate::manager::{GiveawayEvents, GiveawayManager};
pub use crate::models::{Entrant, Giveaway, GiveawayRecord, MemberRecord};
pub use crate::platform::{ChatPlatform, DiscordPlatform};
pub use crate::rules::{BonusEntryRef, BonusRule, ExemptRule, RuleRef, RuleRegistry};
pub use crate::scheduler::EndScheduler;
pub use crate::storage::{GiveawayStorage, GiveawayStore, JsonFileStore};
