pub mod base;
pub mod discord;

// Re-exports for the later usage in the manager and the roll pipeline
pub use crate::platform::base::{ChatPlatform, REACTION_PAGE_SIZE};
pub use crate::platform::discord::DiscordPlatform;
