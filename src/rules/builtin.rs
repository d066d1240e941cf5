use serde_json::Value;
use serenity::async_trait;
use serenity::model::id::RoleId;
use time::{Duration, OffsetDateTime};

use crate::error::{Error, Result};
use crate::models::MemberRecord;
use crate::rules::base::{BonusRule, ExemptRule};

fn u64_param(params: &Value, key: &str, rule: &str) -> Result<u64> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Rule(format!("The '{rule}' rule requires a '{key}' parameter.")))
}

// Grants a fixed amount of extra tickets to members with the given role.
// Parameters: {"role": <role id>, "amount": <tickets>}.
pub struct RoleBonus;

impl RoleBonus {
    pub const KEY: &'static str = "role_bonus";
}

#[async_trait]
impl BonusRule for RoleBonus {
    async fn entries(&self, member: &MemberRecord, params: &Value) -> Result<u64> {
        let role = RoleId::new(u64_param(params, "role", RoleBonus::KEY)?);
        let amount = u64_param(params, "amount", RoleBonus::KEY)?;
        match member.has_role(role) {
            true => Ok(amount),
            false => Ok(0),
        }
    }
}

// Excludes members holding any of the given roles.
// Parameters: {"roles": [<role id>, ...]}.
pub struct RoleExempt;

impl RoleExempt {
    pub const KEY: &'static str = "role_exempt";
}

#[async_trait]
impl ExemptRule for RoleExempt {
    async fn is_exempt(&self, member: &MemberRecord, params: &Value) -> Result<bool> {
        let roles = params
            .get("roles")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::Rule(format!(
                    "The '{}' rule requires a 'roles' parameter.",
                    RoleExempt::KEY
                ))
            })?;
        let is_exempt = roles
            .iter()
            .filter_map(Value::as_u64)
            .any(|role| member.has_role(RoleId::new(role)));
        Ok(is_exempt)
    }
}

// Excludes members who joined the guild less than the given number of
// days ago. Members with an unknown join date are excluded as well.
// Parameters: {"min_days": <days>}.
pub struct MemberAgeExempt;

impl MemberAgeExempt {
    pub const KEY: &'static str = "member_age_exempt";
}

#[async_trait]
impl ExemptRule for MemberAgeExempt {
    async fn is_exempt(&self, member: &MemberRecord, params: &Value) -> Result<bool> {
        let min_days = u64_param(params, "min_days", MemberAgeExempt::KEY)?;
        let Some(joined_at) = member.joined_at else {
            return Ok(true);
        };
        let tenure = OffsetDateTime::now_utc() - joined_at;
        Ok(tenure < Duration::days(min_days as i64))
    }
}
