use std::sync::Arc;

use dashmap::DashMap;

use crate::rules::base::{BonusRule, ExemptRule};
use crate::rules::builtin::{MemberAgeExempt, RoleBonus, RoleExempt};

// Registry of named, statically compiled rules. Giveaway records refer
// to rules by key, so everything a rule can do is defined by the code
// registered here rather than by stored data.
#[derive(Clone)]
pub struct RuleRegistry {
    bonus_rules: Arc<DashMap<String, Arc<dyn BonusRule>>>,
    exempt_rules: Arc<DashMap<String, Arc<dyn ExemptRule>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        RuleRegistry {
            bonus_rules: Arc::new(DashMap::new()),
            exempt_rules: Arc::new(DashMap::new()),
        }
    }

    // Returns a registry with the stock rules registered.
    pub fn with_builtins() -> Self {
        let registry = RuleRegistry::new();
        registry.register_bonus(RoleBonus::KEY, Arc::new(RoleBonus));
        registry.register_exempt(RoleExempt::KEY, Arc::new(RoleExempt));
        registry.register_exempt(MemberAgeExempt::KEY, Arc::new(MemberAgeExempt));
        registry
    }

    pub fn register_bonus(&self, key: &str, rule: Arc<dyn BonusRule>) {
        self.bonus_rules.insert(key.to_string(), rule);
    }

    pub fn register_exempt(&self, key: &str, rule: Arc<dyn ExemptRule>) {
        self.exempt_rules.insert(key.to_string(), rule);
    }

    // Returns the bonus rule registered for the given key.
    pub fn bonus(&self, key: &str) -> Option<Arc<dyn BonusRule>> {
        self.bonus_rules.get(key).map(|rule| rule.value().clone())
    }

    // Returns the exempt rule registered for the given key.
    pub fn exempt(&self, key: &str) -> Option<Arc<dyn ExemptRule>> {
        self.exempt_rules.get(key).map(|rule| rule.value().clone())
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        RuleRegistry::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use serenity::async_trait;

    use crate::error::Result;
    use crate::models::MemberRecord;
    use crate::rules::base::BonusRule;
    use crate::rules::registry::RuleRegistry;

    struct FixedBonus(u64);

    #[async_trait]
    impl BonusRule for FixedBonus {
        async fn entries(&self, _member: &MemberRecord, _params: &Value) -> Result<u64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_empty_registry_has_no_rules() {
        let registry = RuleRegistry::new();

        assert!(registry.bonus("role_bonus").is_none());
        assert!(registry.exempt("role_exempt").is_none());
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = RuleRegistry::with_builtins();

        assert!(registry.bonus("role_bonus").is_some());
        assert!(registry.exempt("role_exempt").is_some());
        assert!(registry.exempt("member_age_exempt").is_some());
    }

    #[test]
    fn test_custom_rule_lookup_by_key() {
        let registry = RuleRegistry::new();
        registry.register_bonus("booster_bonus", Arc::new(FixedBonus(3)));

        assert!(registry.bonus("booster_bonus").is_some());
        assert!(registry.bonus("unknown_bonus").is_none());
    }
}
