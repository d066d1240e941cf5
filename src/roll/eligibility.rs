use serenity::model::id::UserId;
use tracing::warn;

use crate::models::{Giveaway, MemberRecord};
use crate::platform::ChatPlatform;
use crate::rules::RuleRegistry;

// The full eligibility predicate, applied in order: prior winners are
// out, the user must resolve into a guild member, the exempt member
// rule must not match and the member must not hold any of the exempt
// permissions. Returns the resolved member for eligible users.
pub async fn check_winner_entry(
    platform: &dyn ChatPlatform,
    registry: &RuleRegistry,
    giveaway: &Giveaway,
    user_id: UserId,
) -> Option<MemberRecord> {
    if giveaway.winner_ids().contains(&user_id) {
        return None;
    }

    let member = platform.resolve_member(giveaway.guild_id(), user_id).await?;

    if is_exempt_member(registry, giveaway, &member).await {
        return None;
    }
    if member
        .permissions
        .intersects(giveaway.options().exempt_permissions)
    {
        return None;
    }

    Some(member)
}

// Applies the exempt member rule of the giveaway. Rule failures and
// unknown rule keys fail open: the member stays in the running, and the
// problem is logged for the operator.
async fn is_exempt_member(
    registry: &RuleRegistry,
    giveaway: &Giveaway,
    member: &MemberRecord,
) -> bool {
    let Some(rule_ref) = giveaway.options().exempt_members.as_ref() else {
        return false;
    };
    let Some(rule) = registry.exempt(&rule_ref.key) else {
        warn!(
            "The exempt rule '{}' of the giveaway {} is not registered; skipping it",
            rule_ref.key,
            giveaway.message_id()
        );
        return false;
    };
    match rule.is_exempt(member, &rule_ref.params).await {
        Ok(is_exempt) => is_exempt,
        Err(err) => {
            warn!(
                "The exempt rule '{}' of the giveaway {} failed: {}; skipping it",
                rule_ref.key,
                giveaway.message_id(),
                err
            );
            false
        }
    }
}
