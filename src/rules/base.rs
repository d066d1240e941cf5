use serde::{Deserialize, Serialize};
use serde_json::Value;
use serenity::async_trait;

use crate::error::Result;
use crate::models::MemberRecord;

// Reference to a registered rule: a lookup key for the rule registry
// plus the JSON parameters passed to the rule on each call. Records
// never carry executable code, only these references.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RuleRef {
    pub key: String,
    #[serde(default)]
    pub params: Value,
}

impl RuleRef {
    pub fn new(key: &str) -> Self {
        RuleRef {
            key: key.to_string(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

// A bonus entry rule reference with its accumulation mode.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct BonusEntryRef {
    pub rule: RuleRef,
    #[serde(default)]
    pub cumulative: bool,
}

impl BonusEntryRef {
    pub fn new(rule: RuleRef) -> Self {
        BonusEntryRef {
            rule,
            cumulative: false,
        }
    }

    pub fn cumulative(mut self) -> Self {
        self.cumulative = true;
        self
    }
}

// Grants extra tickets to a member. Zero means no bonus from this rule.
#[async_trait]
pub trait BonusRule: Send + Sync {
    async fn entries(&self, member: &MemberRecord, params: &Value) -> Result<u64>;
}

// Decides whether a member is excluded from winning.
#[async_trait]
pub trait ExemptRule: Send + Sync {
    async fn is_exempt(&self, member: &MemberRecord, params: &Value) -> Result<bool>;
}
