use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};
use serenity::model::Permissions;
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serenity::model::user::User as DiscordUser;
use time::{Duration, OffsetDateTime};

use crate::config::{
    GiveawayDefaults, LastChanceOverride, PauseOverride, PauseState, ResolvedOptions,
};
use crate::error::{Error, Result};
use crate::rules::{BonusEntryRef, RuleRef};

// A user collected from the giveaway reactions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entrant {
    pub user_id: UserId,
    pub username: String,
    pub is_bot: bool,
}

impl From<DiscordUser> for Entrant {
    fn from(discord_user: DiscordUser) -> Self {
        Entrant {
            user_id: discord_user.id,
            username: discord_user.name,
            is_bot: discord_user.bot,
        }
    }
}

// A guild member resolved for the eligibility checks: the roles and the
// effective permissions computed at resolution time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemberRecord {
    pub user_id: UserId,
    pub username: String,
    pub is_bot: bool,
    pub roles: Vec<RoleId>,
    pub permissions: Permissions,
    pub joined_at: Option<OffsetDateTime>,
}

impl MemberRecord {
    // Checks that the member holds the given role.
    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.contains(&role_id)
    }
}

// The persisted form of a giveaway: identity, lifecycle state and the
// raw per-giveaway options. Unset option fields fall back to the
// process defaults when the record is loaded. Timestamps are unix
// milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct GiveawayRecord {
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub message_id: MessageId,
    pub start_at: i64,
    #[serde(default)]
    pub end_at: Option<i64>,
    #[serde(default)]
    pub ended: bool,
    pub prize: String,
    #[serde(default)]
    pub winner_count: Option<u32>,
    #[serde(default)]
    pub winner_ids: Vec<UserId>,
    #[serde(default)]
    pub reaction: Option<String>,
    #[serde(default)]
    pub bots_can_win: Option<bool>,
    #[serde(default)]
    pub embed_color: Option<u32>,
    #[serde(default)]
    pub embed_color_end: Option<u32>,
    #[serde(default)]
    pub exempt_permissions: Option<Permissions>,
    #[serde(default)]
    pub exempt_members: Option<RuleRef>,
    #[serde(default)]
    pub bonus_entries: Vec<BonusEntryRef>,
    #[serde(default)]
    pub last_chance: Option<LastChanceOverride>,
    #[serde(default)]
    pub pause: Option<PauseOverride>,
    #[serde(default)]
    pub is_drop: bool,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub hosted_by: Option<String>,
    #[serde(default)]
    pub extra_data: Option<serde_json::Value>,
}

impl GiveawayRecord {
    pub fn new(
        channel_id: ChannelId,
        guild_id: GuildId,
        message_id: MessageId,
        prize: &str,
    ) -> Self {
        GiveawayRecord {
            channel_id,
            guild_id,
            message_id,
            start_at: millis_from_datetime(OffsetDateTime::now_utc()),
            end_at: None,
            ended: false,
            prize: prize.to_string(),
            winner_count: None,
            winner_ids: Vec::new(),
            reaction: None,
            bots_can_win: None,
            embed_color: None,
            embed_color_end: None,
            exempt_permissions: None,
            exempt_members: None,
            bonus_entries: Vec::new(),
            last_chance: None,
            pause: None,
            is_drop: false,
            thumbnail: None,
            hosted_by: None,
            extra_data: None,
        }
    }

    pub fn with_winner_count(mut self, winner_count: u32) -> Self {
        self.winner_count = Some(winner_count);
        self
    }

    pub fn with_end_at(mut self, end_at: i64) -> Self {
        self.end_at = Some(end_at);
        self
    }
}

fn datetime_from_millis(millis: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .map_err(|_| Error::Giveaway(format!("Invalid timestamp in the giveaway record: {millis}")))
}

fn millis_from_datetime(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000_000) as i64
}

// An in-memory giveaway. The entity is cheap to clone and every clone
// shares the same lifecycle state.
#[derive(Clone, Debug)]
pub struct Giveaway {
    // The record the giveaway was constructed from. Option fields are
    // kept raw, so re-saving the giveaway doesn't pin the defaults.
    raw: Arc<GiveawayRecord>,
    // The effective configuration, resolved once at construction.
    options: Arc<ResolvedOptions>,
    start_at: OffsetDateTime,
    // The planned end. None for drop giveaways which run until enough
    // entrants react.
    end_at: Arc<AtomicCell<Option<OffsetDateTime>>>,
    // A flag that determines the current phase of the giveaway.
    // false - The giveaway is running and can be rolled
    // true - The giveaway has ended and winners were drawn
    ended: Arc<AtomicBool>,
    // Set while a roll is in progress to keep concurrent end and
    // reroll calls from racing each other.
    rolling: Arc<AtomicBool>,
    // Everyone who has won this giveaway, in the order of the draws.
    winner_ids: Arc<Mutex<Vec<UserId>>>,
    pause: Arc<Mutex<PauseState>>,
}

impl Giveaway {
    pub fn from_record(record: &GiveawayRecord, defaults: &GiveawayDefaults) -> Result<Self> {
        if record.winner_count == Some(0) {
            let message = format!(
                "The giveaway {} requires at least one winner.",
                record.message_id
            );
            return Err(Error::Giveaway(message));
        }
        let start_at = datetime_from_millis(record.start_at)?;
        let end_at = match record.end_at {
            Some(millis) => {
                let end_at = datetime_from_millis(millis)?;
                if end_at < start_at {
                    let message =
                        format!("The giveaway {} ends before it starts.", record.message_id);
                    return Err(Error::Giveaway(message));
                }
                Some(end_at)
            }
            None => None,
        };

        let options = ResolvedOptions::resolve(record, defaults);
        let pause = options.pause.clone();
        Ok(Giveaway {
            raw: Arc::new(record.clone()),
            options: Arc::new(options),
            start_at,
            end_at: Arc::new(AtomicCell::new(end_at)),
            ended: Arc::new(AtomicBool::new(record.ended)),
            rolling: Arc::new(AtomicBool::new(false)),
            winner_ids: Arc::new(Mutex::new(record.winner_ids.clone())),
            pause: Arc::new(Mutex::new(pause)),
        })
    }

    // Returns a snapshot of the giveaway suitable for persisting: the
    // raw options as they were loaded plus the current lifecycle state.
    pub fn to_record(&self) -> GiveawayRecord {
        let mut record = (*self.raw).clone();
        record.ended = self.has_ended();
        record.winner_ids = self.winner_ids();
        record.end_at = self.end_at.load().map(millis_from_datetime);

        let pause = self.pause_state();
        let mut pause_override = record.pause.unwrap_or_default();
        pause_override.is_paused = Some(pause.is_paused);
        pause_override.duration_after_pause_ms = pause.duration_after_pause_ms;
        record.pause = Some(pause_override);
        record
    }

    pub fn channel_id(&self) -> ChannelId {
        self.raw.channel_id
    }

    pub fn guild_id(&self) -> GuildId {
        self.raw.guild_id
    }

    pub fn message_id(&self) -> MessageId {
        self.raw.message_id
    }

    // Returns the effective configuration of the giveaway.
    pub fn options(&self) -> &ResolvedOptions {
        &self.options
    }

    pub fn prize(&self) -> String {
        self.options.prize.clone()
    }

    pub fn is_drop(&self) -> bool {
        self.options.is_drop
    }

    pub fn thumbnail(&self) -> Option<String> {
        self.raw.thumbnail.clone()
    }

    pub fn hosted_by(&self) -> Option<String> {
        self.raw.hosted_by.clone()
    }

    pub fn extra_data(&self) -> Option<serde_json::Value> {
        self.raw.extra_data.clone()
    }

    pub fn start_at(&self) -> OffsetDateTime {
        self.start_at
    }

    // Returns the planned end, or None for giveaways without one.
    pub fn end_at(&self) -> Option<OffsetDateTime> {
        self.end_at.load()
    }

    // Returns the planned running time of the giveaway.
    pub fn duration(&self) -> Option<Duration> {
        self.end_at.load().map(|end_at| end_at - self.start_at)
    }

    // Returns the time left until the planned end. The result is
    // negative once the deadline has passed.
    pub fn remaining_time(&self, now: OffsetDateTime) -> Option<Duration> {
        self.end_at.load().map(|end_at| end_at - now)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    // Flips the giveaway into the ended state. Returns true for the
    // caller that actually performed the transition.
    pub fn mark_ended(&self) -> bool {
        self.ended
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    // Claims the exclusive right to roll winners. Returns false when
    // another roll is already in progress.
    pub fn try_begin_roll(&self) -> bool {
        self.rolling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn finish_roll(&self) {
        self.rolling.store(false, Ordering::SeqCst);
    }

    // Returns everyone who has won this giveaway so far.
    pub fn winner_ids(&self) -> Vec<UserId> {
        self.winner_ids.lock().unwrap().clone()
    }

    pub fn record_winners(&self, winners: &[UserId]) {
        self.winner_ids.lock().unwrap().extend_from_slice(winners);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.lock().unwrap().is_paused
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause.lock().unwrap().clone()
    }

    // Pauses the giveaway and captures the time left on the clock, so
    // the unpause can restore it.
    pub fn pause_now(&self, now: OffsetDateTime) -> Result<()> {
        if self.is_drop() {
            let message = format!("The drop giveaway {} cannot be paused.", self.message_id());
            return Err(Error::Giveaway(message));
        }
        if self.has_ended() {
            let message = format!("The giveaway {} has already ended.", self.message_id());
            return Err(Error::Giveaway(message));
        }

        let mut pause = self.pause.lock().unwrap();
        if pause.is_paused {
            let message = format!("The giveaway {} is already paused.", self.message_id());
            return Err(Error::Giveaway(message));
        }
        pause.duration_after_pause_ms = self
            .end_at
            .load()
            .map(|end_at| (end_at - now).whole_milliseconds() as i64);
        pause.is_paused = true;
        Ok(())
    }

    // Resumes the giveaway and shifts the planned end by the captured
    // remaining time.
    pub fn unpause_now(&self, now: OffsetDateTime) -> Result<()> {
        let mut pause = self.pause.lock().unwrap();
        if !pause.is_paused {
            let message = format!("The giveaway {} is not paused.", self.message_id());
            return Err(Error::Giveaway(message));
        }
        if let Some(millis) = pause.duration_after_pause_ms.take() {
            self.end_at
                .store(Some(now + Duration::milliseconds(millis)));
        }
        pause.is_paused = false;
        Ok(())
    }

    // Checks that the giveaway is inside the last chance window: still
    // running and closer to the planned end than the threshold.
    pub fn is_in_last_chance(&self, now: OffsetDateTime) -> bool {
        let last_chance = &self.options.last_chance;
        if !last_chance.enabled || self.has_ended() || self.is_paused() {
            return false;
        }
        let Some(remaining) = self.remaining_time(now) else {
            return false;
        };
        remaining > Duration::ZERO && remaining <= last_chance.threshold()
    }
}

impl Eq for Giveaway {}

impl PartialEq for Giveaway {
    fn eq(&self, other: &Self) -> bool {
        self.message_id() == other.message_id()
    }
}
