pub mod collector;
pub mod eligibility;
pub mod entries;
pub mod selector;

// Re-exports for the later usage in the manager
pub use crate::roll::collector::collect_entrants;
pub use crate::roll::eligibility::check_winner_entry;
pub use crate::roll::entries::extra_entries;
pub use crate::roll::selector::{WeightedCandidate, select_winners};

use crate::error::Result;
use crate::models::{Giveaway, MemberRecord};
use crate::platform::ChatPlatform;
use crate::rules::RuleRegistry;

// Runs the whole winner determination: collect the entrants, filter
// them through the eligibility predicate, weigh the survivors with
// their bonus entries and draw the winners from the resulting pool.
pub async fn roll(
    platform: &dyn ChatPlatform,
    registry: &RuleRegistry,
    giveaway: &Giveaway,
    winner_count: u32,
) -> Result<Vec<MemberRecord>> {
    let entrants = collect_entrants(platform, giveaway).await?;
    if entrants.is_empty() {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<WeightedCandidate> = Vec::new();
    for entrant in &entrants {
        let Some(member) = check_winner_entry(platform, registry, giveaway, entrant.user_id).await
        else {
            continue;
        };
        let extra = extra_entries(registry, giveaway, &member).await?;
        candidates.push(WeightedCandidate::with_extra(entrant.user_id, extra));
    }
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    Ok(select_winners(platform, registry, giveaway, &candidates, winner_count).await)
}
