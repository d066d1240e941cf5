use crate::error::{Error, Result};
use crate::models::{Giveaway, MemberRecord};
use crate::rules::RuleRegistry;

// Computes the extra tickets a member gets from the bonus entry rules
// of the giveaway. Cumulative rules are summed into one contender,
// non-cumulative rules stand alone, and the member receives the largest
// contender. No matching rules means zero extra tickets. Any rule
// failure aborts the whole evaluation. The sum saturates instead of
// overflowing on absurd configured amounts.
pub async fn extra_entries(
    registry: &RuleRegistry,
    giveaway: &Giveaway,
    member: &MemberRecord,
) -> Result<u64> {
    let mut contenders: Vec<u64> = vec![0];
    let mut cumulative: Vec<u64> = Vec::new();

    for bonus in &giveaway.options().bonus_entries {
        let Some(rule) = registry.bonus(&bonus.rule.key) else {
            return Err(Error::BonusRule {
                message_id: giveaway.message_id(),
                rule: bonus.rule.key.clone(),
                reason: "the rule is not registered".to_string(),
            });
        };
        match rule.entries(member, &bonus.rule.params).await {
            Ok(0) => {}
            Ok(amount) => match bonus.cumulative {
                true => cumulative.push(amount),
                false => contenders.push(amount),
            },
            Err(err) => {
                return Err(Error::BonusRule {
                    message_id: giveaway.message_id(),
                    rule: bonus.rule.key.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    if !cumulative.is_empty() {
        let summed = cumulative
            .iter()
            .fold(0u64, |total, amount| total.saturating_add(*amount));
        contenders.push(summed);
    }
    Ok(contenders.into_iter().max().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use serenity::async_trait;
    use serenity::model::Permissions;
    use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

    use crate::config::GiveawayDefaults;
    use crate::error::{Error, Result};
    use crate::models::{Giveaway, GiveawayRecord, MemberRecord};
    use crate::roll::entries::extra_entries;
    use crate::rules::{BonusEntryRef, BonusRule, RuleRef, RuleRegistry};

    struct FixedBonus(u64);

    #[async_trait]
    impl BonusRule for FixedBonus {
        async fn entries(&self, _member: &MemberRecord, _params: &Value) -> Result<u64> {
            Ok(self.0)
        }
    }

    struct FailingBonus;

    #[async_trait]
    impl BonusRule for FailingBonus {
        async fn entries(&self, _member: &MemberRecord, _params: &Value) -> Result<u64> {
            Err(Error::Rule("the backing service is down".to_string()))
        }
    }

    fn get_member() -> MemberRecord {
        MemberRecord {
            user_id: UserId::new(1),
            username: "Test".to_string(),
            is_bot: false,
            roles: Vec::new(),
            permissions: Permissions::empty(),
            joined_at: None,
        }
    }

    fn get_registry() -> RuleRegistry {
        let registry = RuleRegistry::new();
        registry.register_bonus("two", Arc::new(FixedBonus(2)));
        registry.register_bonus("three", Arc::new(FixedBonus(3)));
        registry.register_bonus("seven", Arc::new(FixedBonus(7)));
        registry.register_bonus("zero", Arc::new(FixedBonus(0)));
        registry.register_bonus("huge", Arc::new(FixedBonus(u64::MAX)));
        registry.register_bonus("flaky", Arc::new(FailingBonus));
        registry
    }

    fn get_giveaway(bonus_entries: Vec<BonusEntryRef>) -> Giveaway {
        let mut record = GiveawayRecord::new(
            ChannelId::new(1),
            GuildId::new(2),
            MessageId::new(3),
            "Discord Nitro",
        );
        record.bonus_entries = bonus_entries;
        Giveaway::from_record(&record, &GiveawayDefaults::default()).unwrap()
    }

    #[tokio::test]
    async fn test_no_rules_grant_nothing() {
        let giveaway = get_giveaway(Vec::new());

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(entries, Ok(0));
    }

    #[tokio::test]
    async fn test_cumulative_rules_are_summed() {
        let giveaway = get_giveaway(vec![
            BonusEntryRef::new(RuleRef::new("two")).cumulative(),
            BonusEntryRef::new(RuleRef::new("three")).cumulative(),
        ]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(entries, Ok(5));
    }

    #[tokio::test]
    async fn test_cumulative_sum_wins_over_smaller_standalone() {
        let giveaway = get_giveaway(vec![
            BonusEntryRef::new(RuleRef::new("two")),
            BonusEntryRef::new(RuleRef::new("two")).cumulative(),
            BonusEntryRef::new(RuleRef::new("three")).cumulative(),
        ]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(entries, Ok(5));
    }

    #[tokio::test]
    async fn test_standalone_wins_over_smaller_cumulative_sum() {
        let giveaway = get_giveaway(vec![
            BonusEntryRef::new(RuleRef::new("seven")),
            BonusEntryRef::new(RuleRef::new("two")).cumulative(),
            BonusEntryRef::new(RuleRef::new("three")).cumulative(),
        ]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(entries, Ok(7));
    }

    #[tokio::test]
    async fn test_cumulative_sums_saturate_at_the_integer_limit() {
        let giveaway = get_giveaway(vec![
            BonusEntryRef::new(RuleRef::new("huge")).cumulative(),
            BonusEntryRef::new(RuleRef::new("three")).cumulative(),
        ]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(entries, Ok(u64::MAX));
    }

    #[tokio::test]
    async fn test_zero_results_are_discarded() {
        let giveaway = get_giveaway(vec![
            BonusEntryRef::new(RuleRef::new("zero")),
            BonusEntryRef::new(RuleRef::new("zero")).cumulative(),
        ]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(entries, Ok(0));
    }

    #[tokio::test]
    async fn test_rule_failure_aborts_the_evaluation() {
        let giveaway = get_giveaway(vec![
            BonusEntryRef::new(RuleRef::new("seven")),
            BonusEntryRef::new(RuleRef::new("flaky")),
        ]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(
            entries,
            Err(Error::BonusRule {
                message_id: MessageId::new(3),
                rule: "flaky".to_string(),
                reason: "the backing service is down".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_unregistered_rule_aborts_the_evaluation() {
        let giveaway = get_giveaway(vec![BonusEntryRef::new(RuleRef::new("missing"))]);

        let entries = extra_entries(&get_registry(), &giveaway, &get_member()).await;

        assert_eq!(
            entries,
            Err(Error::BonusRule {
                message_id: MessageId::new(3),
                rule: "missing".to_string(),
                reason: "the rule is not registered".to_string(),
            })
        );
    }
}
