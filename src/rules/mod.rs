pub mod base;
pub mod builtin;
pub mod registry;

// Re-exports for the later usage in the roll pipeline
pub use crate::rules::base::{BonusEntryRef, BonusRule, ExemptRule, RuleRef};
pub use crate::rules::builtin::{MemberAgeExempt, RoleBonus, RoleExempt};
pub use crate::rules::registry::RuleRegistry;
