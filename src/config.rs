use serde::{Deserialize, Serialize};
use serenity::model::Permissions;
use time::Duration;

use crate::models::GiveawayRecord;
use crate::rules::{BonusEntryRef, RuleRef};

pub const DEFAULT_REACTION: &str = "🎉";
pub const DEFAULT_EMBED_COLOR: u32 = 0xFF0000;
pub const DEFAULT_EMBED_COLOR_END: u32 = 0x000000;
pub const DEFAULT_LAST_CHANCE_CONTENT: &str = "⚠️ **LAST CHANCE TO ENTER !** ⚠️";
pub const DEFAULT_PAUSE_CONTENT: &str = "⚠️ **THIS GIVEAWAY IS PAUSED !** ⚠️";
pub const DEFAULT_END_CHECK_INTERVAL: Duration = Duration::seconds(15);

// Process-wide defaults applied to any giveaway that doesn't override
// the matching field in its own record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GiveawayDefaults {
    pub reaction: String,
    pub bots_can_win: bool,
    pub embed_color: u32,
    pub embed_color_end: u32,
    pub exempt_permissions: Permissions,
    pub exempt_members: Option<RuleRef>,
    pub last_chance: LastChanceOptions,
    pub pause: PauseState,
    pub end_check_interval: Duration,
}

impl Default for GiveawayDefaults {
    fn default() -> Self {
        GiveawayDefaults {
            reaction: DEFAULT_REACTION.to_string(),
            bots_can_win: false,
            embed_color: DEFAULT_EMBED_COLOR,
            embed_color_end: DEFAULT_EMBED_COLOR_END,
            exempt_permissions: Permissions::empty(),
            exempt_members: None,
            last_chance: LastChanceOptions::default(),
            pause: PauseState::default(),
            end_check_interval: DEFAULT_END_CHECK_INTERVAL,
        }
    }
}

// Last chance notice shown shortly before the giveaway ends.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct LastChanceOptions {
    pub enabled: bool,
    pub content: String,
    pub threshold_ms: i64,
    pub embed_color: u32,
}

impl LastChanceOptions {
    // Returns the threshold as a duration before the planned end.
    pub fn threshold(&self) -> Duration {
        Duration::milliseconds(self.threshold_ms)
    }

    // Returns the defaults overlaid with the giveaway-level overrides,
    // merged field-by-field.
    pub fn merged(defaults: &LastChanceOptions, overrides: Option<&LastChanceOverride>) -> Self {
        let Some(overrides) = overrides else {
            return defaults.clone();
        };
        LastChanceOptions {
            enabled: overrides.enabled.unwrap_or(defaults.enabled),
            content: overrides
                .content
                .clone()
                .unwrap_or_else(|| defaults.content.clone()),
            threshold_ms: overrides.threshold_ms.unwrap_or(defaults.threshold_ms),
            embed_color: overrides.embed_color.unwrap_or(defaults.embed_color),
        }
    }
}

impl Default for LastChanceOptions {
    fn default() -> Self {
        LastChanceOptions {
            enabled: false,
            content: DEFAULT_LAST_CHANCE_CONTENT.to_string(),
            threshold_ms: 10_000,
            embed_color: DEFAULT_EMBED_COLOR,
        }
    }
}

// Per-giveaway overrides for the last chance notice. Unset fields
// fall back to the process defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LastChanceOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub threshold_ms: Option<i64>,
    #[serde(default)]
    pub embed_color: Option<u32>,
}

// Pause state of a giveaway: the paused flag, the display settings and
// the remaining duration captured at the moment of pausing.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PauseState {
    pub is_paused: bool,
    pub content: String,
    pub embed_color: u32,
    pub duration_after_pause_ms: Option<i64>,
}

impl PauseState {
    // Returns the defaults overlaid with the giveaway-level overrides,
    // merged field-by-field.
    pub fn merged(defaults: &PauseState, overrides: Option<&PauseOverride>) -> Self {
        let Some(overrides) = overrides else {
            return defaults.clone();
        };
        PauseState {
            is_paused: overrides.is_paused.unwrap_or(defaults.is_paused),
            content: overrides
                .content
                .clone()
                .unwrap_or_else(|| defaults.content.clone()),
            embed_color: overrides.embed_color.unwrap_or(defaults.embed_color),
            duration_after_pause_ms: overrides
                .duration_after_pause_ms
                .or(defaults.duration_after_pause_ms),
        }
    }
}

impl Default for PauseState {
    fn default() -> Self {
        PauseState {
            is_paused: false,
            content: DEFAULT_PAUSE_CONTENT.to_string(),
            embed_color: 0xFFFF00,
            duration_after_pause_ms: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PauseOverride {
    #[serde(default)]
    pub is_paused: Option<bool>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub embed_color: Option<u32>,
    #[serde(default)]
    pub duration_after_pause_ms: Option<i64>,
}

// The effective configuration of a single giveaway: every tunable with
// the giveaway-level value when present and the process default
// otherwise. Computed once when the giveaway is constructed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedOptions {
    pub winner_count: u32,
    pub prize: String,
    pub reaction: String,
    pub bots_can_win: bool,
    pub embed_color: u32,
    pub embed_color_end: u32,
    pub exempt_permissions: Permissions,
    pub exempt_members: Option<RuleRef>,
    pub bonus_entries: Vec<BonusEntryRef>,
    pub last_chance: LastChanceOptions,
    pub pause: PauseState,
    pub is_drop: bool,
}

impl ResolvedOptions {
    // Returns the effective configuration for the given record. The
    // resolution is pure: the same record and defaults always produce
    // the same result.
    pub fn resolve(record: &GiveawayRecord, defaults: &GiveawayDefaults) -> Self {
        ResolvedOptions {
            winner_count: record.winner_count.unwrap_or(1),
            prize: record.prize.clone(),
            reaction: record
                .reaction
                .clone()
                .unwrap_or_else(|| defaults.reaction.clone()),
            bots_can_win: record.bots_can_win.unwrap_or(defaults.bots_can_win),
            embed_color: record.embed_color.unwrap_or(defaults.embed_color),
            embed_color_end: record.embed_color_end.unwrap_or(defaults.embed_color_end),
            exempt_permissions: record
                .exempt_permissions
                .unwrap_or(defaults.exempt_permissions),
            exempt_members: record
                .exempt_members
                .clone()
                .or_else(|| defaults.exempt_members.clone()),
            bonus_entries: record.bonus_entries.clone(),
            last_chance: LastChanceOptions::merged(&defaults.last_chance, record.last_chance.as_ref()),
            pause: PauseState::merged(&defaults.pause, record.pause.as_ref()),
            is_drop: record.is_drop,
        }
    }
}

#[cfg(test)]
mod tests {
    use serenity::model::Permissions;
    use serenity::model::id::{ChannelId, GuildId, MessageId};

    use crate::config::{
        DEFAULT_EMBED_COLOR, DEFAULT_LAST_CHANCE_CONTENT, GiveawayDefaults, LastChanceOverride,
        PauseOverride, ResolvedOptions,
    };
    use crate::models::GiveawayRecord;
    use crate::rules::RuleRef;

    fn get_record() -> GiveawayRecord {
        GiveawayRecord::new(
            ChannelId::new(1),
            GuildId::new(2),
            MessageId::new(3),
            "Discord Nitro",
        )
    }

    #[test]
    fn test_resolve_uses_defaults_for_unset_fields() {
        let record = get_record();
        let defaults = GiveawayDefaults::default();

        let options = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(options.winner_count, 1);
        assert_eq!(options.prize, "Discord Nitro".to_string());
        assert_eq!(options.reaction, "🎉".to_string());
        assert_eq!(options.bots_can_win, false);
        assert_eq!(options.embed_color, DEFAULT_EMBED_COLOR);
        assert_eq!(options.exempt_permissions, Permissions::empty());
        assert_eq!(options.exempt_members, None);
        assert_eq!(options.is_drop, false);
    }

    #[test]
    fn test_resolve_prefers_giveaway_level_values() {
        let mut record = get_record();
        record.winner_count = Some(5);
        record.reaction = Some("🎁".to_string());
        record.bots_can_win = Some(true);
        record.embed_color = Some(0x00FF00);
        record.exempt_permissions = Some(Permissions::MANAGE_GUILD);
        let defaults = GiveawayDefaults::default();

        let options = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(options.winner_count, 5);
        assert_eq!(options.reaction, "🎁".to_string());
        assert_eq!(options.bots_can_win, true);
        assert_eq!(options.embed_color, 0x00FF00);
        assert_eq!(options.exempt_permissions, Permissions::MANAGE_GUILD);
    }

    #[test]
    fn test_resolve_falls_back_to_default_exempt_rule() {
        let record = get_record();
        let mut defaults = GiveawayDefaults::default();
        defaults.exempt_members = Some(RuleRef::new("role_exempt"));

        let options = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(options.exempt_members, Some(RuleRef::new("role_exempt")));
    }

    #[test]
    fn test_resolve_prefers_giveaway_level_exempt_rule() {
        let mut record = get_record();
        record.exempt_members = Some(RuleRef::new("member_age_exempt"));
        let mut defaults = GiveawayDefaults::default();
        defaults.exempt_members = Some(RuleRef::new("role_exempt"));

        let options = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(
            options.exempt_members,
            Some(RuleRef::new("member_age_exempt"))
        );
    }

    #[test]
    fn test_last_chance_merge_is_field_by_field() {
        let mut record = get_record();
        record.last_chance = Some(LastChanceOverride {
            enabled: Some(true),
            threshold_ms: Some(5_000),
            ..Default::default()
        });
        let defaults = GiveawayDefaults::default();

        let options = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(options.last_chance.enabled, true);
        assert_eq!(options.last_chance.threshold_ms, 5_000);
        assert_eq!(
            options.last_chance.content,
            DEFAULT_LAST_CHANCE_CONTENT.to_string()
        );
        assert_eq!(options.last_chance.embed_color, DEFAULT_EMBED_COLOR);
    }

    #[test]
    fn test_pause_merge_keeps_unset_display_fields() {
        let mut record = get_record();
        record.pause = Some(PauseOverride {
            is_paused: Some(true),
            embed_color: Some(0x0000FF),
            ..Default::default()
        });
        let defaults = GiveawayDefaults::default();

        let options = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(options.pause.is_paused, true);
        assert_eq!(options.pause.embed_color, 0x0000FF);
        assert_eq!(options.pause.content, defaults.pause.content);
        assert_eq!(options.pause.duration_after_pause_ms, None);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut record = get_record();
        record.winner_count = Some(3);
        record.bots_can_win = Some(true);
        let defaults = GiveawayDefaults::default();

        let first = ResolvedOptions::resolve(&record, &defaults);
        let second = ResolvedOptions::resolve(&record, &defaults);

        assert_eq!(first, second);
    }
}
