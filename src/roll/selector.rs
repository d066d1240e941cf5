use rand::Rng;
use serenity::model::id::UserId;
use tracing::debug;

use crate::models::{Giveaway, MemberRecord};
use crate::platform::ChatPlatform;
use crate::roll::eligibility::check_winner_entry;
use crate::rules::RuleRegistry;

// An eligible candidate with the total amount of tickets in the pool:
// the base ticket plus the extra entries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WeightedCandidate {
    pub user_id: UserId,
    pub tickets: u64,
}

impl WeightedCandidate {
    // The total saturates instead of overflowing on absurd extra
    // amounts.
    pub fn with_extra(user_id: UserId, extra: u64) -> Self {
        WeightedCandidate {
            user_id,
            tickets: extra.saturating_add(1),
        }
    }
}

// Draws the winners from the weighted pool. Every candidate holds as
// many pool slots as they have tickets, and each draw removes a slot
// uniformly at random. A drawn candidate is confirmed by re-running the
// eligibility predicate; on failure the remaining pool is scanned in
// order for a replacement. Confirmed winners are re-resolved at the
// end, and anyone who no longer resolves is dropped without a
// replacement.
pub async fn select_winners(
    platform: &dyn ChatPlatform,
    registry: &RuleRegistry,
    giveaway: &Giveaway,
    candidates: &[WeightedCandidate],
    winner_count: u32,
) -> Vec<MemberRecord> {
    let target = (winner_count as usize).min(candidates.len());
    let mut pool: Vec<UserId> = Vec::new();
    for candidate in candidates {
        for _ in 0..candidate.tickets {
            pool.push(candidate.user_id);
        }
    }

    let mut shortlist: Vec<UserId> = Vec::with_capacity(target);
    {
        // The rng handle is not Send, so it must not live across the
        // confirmation awaits below.
        let mut rng = rand::thread_rng();
        for _ in 0..target {
            if pool.is_empty() {
                break;
            }
            let index = rng.gen_range(0..pool.len());
            shortlist.push(pool.swap_remove(index));
        }
    }

    let mut winners: Vec<UserId> = Vec::with_capacity(target);
    for user_id in shortlist {
        let confirmed = !winners.contains(&user_id)
            && check_winner_entry(platform, registry, giveaway, user_id)
                .await
                .is_some();
        if confirmed {
            winners.push(user_id);
            continue;
        }

        for &fallback in pool.iter() {
            if winners.contains(&fallback) {
                continue;
            }
            if check_winner_entry(platform, registry, giveaway, fallback)
                .await
                .is_some()
            {
                winners.push(fallback);
                break;
            }
        }
    }

    let mut resolved: Vec<MemberRecord> = Vec::with_capacity(winners.len());
    for user_id in winners {
        match platform.resolve_member(giveaway.guild_id(), user_id).await {
            Some(member) => resolved.push(member),
            None => debug!(
                "The winner {} of the giveaway {} no longer resolves; dropping them",
                user_id,
                giveaway.message_id()
            ),
        }
    }
    resolved
}
