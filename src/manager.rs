use std::sync::Arc;

use dashmap::DashMap;
use serenity::async_trait;
use serenity::model::id::{MessageId, UserId};
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GiveawayDefaults;
use crate::error::{Error, Result};
use crate::models::{Giveaway, GiveawayRecord, MemberRecord};
use crate::platform::ChatPlatform;
use crate::roll;
use crate::rules::RuleRegistry;
use crate::scheduler::{DEFAULT_ARM_HORIZON, TimerRegistry};
use crate::storage::GiveawayStore;

// Host-facing notifications, emitted after the matching transition has
// been applied and persisted. The default implementations do nothing,
// so hosts only override what they present to their users.
#[async_trait]
pub trait GiveawayEvents: Send + Sync {
    async fn giveaway_ended(&self, _giveaway: &Giveaway, _winners: &[MemberRecord]) {}

    async fn giveaway_rerolled(&self, _giveaway: &Giveaway, _winners: &[MemberRecord]) {}

    async fn giveaway_deleted(&self, _message_id: MessageId) {}
}

struct NoopEvents;

#[async_trait]
impl GiveawayEvents for NoopEvents {}

// The entry point of the engine: tracks every live giveaway, owns
// their end timers and runs the lifecycle transitions. The chat
// backend and the record store are injected at construction.
pub struct GiveawayManager {
    platform: Arc<dyn ChatPlatform>,
    store: Arc<dyn GiveawayStore>,
    registry: RuleRegistry,
    defaults: GiveawayDefaults,
    events: Arc<dyn GiveawayEvents>,
    giveaways: DashMap<MessageId, Giveaway>,
    timers: TimerRegistry,
}

impl GiveawayManager {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn GiveawayStore>,
        defaults: GiveawayDefaults,
    ) -> Self {
        GiveawayManager {
            platform,
            store,
            registry: RuleRegistry::with_builtins(),
            defaults,
            events: Arc::new(NoopEvents),
            giveaways: DashMap::new(),
            timers: TimerRegistry::new(),
        }
    }

    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn GiveawayEvents>) -> Self {
        self.events = events;
        self
    }

    // Returns the process-wide defaults the giveaways are resolved
    // against.
    pub fn defaults(&self) -> &GiveawayDefaults {
        &self.defaults
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    // Returns a snapshot of every tracked giveaway.
    pub fn get_giveaways(&self) -> Vec<Giveaway> {
        self.giveaways
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_giveaway(&self, message_id: MessageId) -> Result<Giveaway> {
        match self.giveaways.get(&message_id) {
            Some(entry) => Ok(entry.value().clone()),
            None => {
                let message = format!("The requested giveaway was not found.");
                Err(Error::Giveaway(message))
            }
        }
    }

    // Loads every stored record back into memory. Records that no
    // longer construct a valid giveaway are skipped with a warning.
    pub async fn restore(&self) -> Result<usize> {
        let records = self.store.load_all().await?;
        let mut restored = 0;
        for record in records {
            match Giveaway::from_record(&record, &self.defaults) {
                Ok(giveaway) => {
                    self.giveaways.insert(giveaway.message_id(), giveaway);
                    restored += 1;
                }
                Err(err) => {
                    warn!("Skipping the stored giveaway {}: {}", record.message_id, err)
                }
            }
        }
        Ok(restored)
    }

    // Starts tracking a giveaway for an already posted message and
    // persists it.
    pub async fn add_giveaway(&self, record: GiveawayRecord) -> Result<Giveaway> {
        if self.giveaways.contains_key(&record.message_id) {
            let message = format!("The giveaway {} is already tracked.", record.message_id);
            return Err(Error::Giveaway(message));
        }
        let giveaway = Giveaway::from_record(&record, &self.defaults)?;
        self.store.save(&giveaway.to_record()).await?;
        self.giveaways
            .insert(giveaway.message_id(), giveaway.clone());
        info!("The giveaway {} is now tracked", giveaway.message_id());
        Ok(giveaway)
    }

    // Ends the giveaway: draws the winners, flips the ended flag,
    // persists the outcome and notifies the host. Concurrent calls are
    // serialized through the roll guard and only one of them performs
    // the transition.
    pub async fn end(&self, message_id: MessageId) -> Result<Vec<MemberRecord>> {
        let giveaway = self.get_giveaway(message_id)?;
        if giveaway.has_ended() {
            let message = format!("The giveaway {message_id} has already ended.");
            return Err(Error::Giveaway(message));
        }
        if !giveaway.try_begin_roll() {
            let message = format!("A roll for the giveaway {message_id} is already in progress.");
            return Err(Error::Giveaway(message));
        }
        let result = self.end_giveaway(&giveaway).await;
        giveaway.finish_roll();
        result
    }

    async fn end_giveaway(&self, giveaway: &Giveaway) -> Result<Vec<MemberRecord>> {
        let message_id = giveaway.message_id();
        // A racing end may have completed while this call was waiting
        // for the roll guard.
        if giveaway.has_ended() {
            let message = format!("The giveaway {message_id} has already ended.");
            return Err(Error::Giveaway(message));
        }
        if !self
            .platform
            .message_exists(giveaway.channel_id(), message_id)
            .await
        {
            self.handle_missing_message(giveaway).await;
            return Err(Error::MessageNotFound(message_id));
        }

        let winner_count = giveaway.options().winner_count;
        let winners =
            roll::roll(self.platform.as_ref(), &self.registry, giveaway, winner_count).await?;
        let winner_ids: Vec<UserId> = winners.iter().map(|member| member.user_id).collect();
        giveaway.record_winners(&winner_ids);
        giveaway.mark_ended();
        self.timers.disarm_remove(message_id);
        self.persist(giveaway).await?;

        info!(
            "The giveaway {} ended with {} winner(s)",
            message_id,
            winners.len()
        );
        self.events.giveaway_ended(giveaway, &winners).await;
        Ok(winners)
    }

    // Draws additional winners for an ended giveaway. Prior winners
    // are excluded by the eligibility predicate, and the new winners
    // are appended to the winner list.
    pub async fn reroll(
        &self,
        message_id: MessageId,
        winner_count: Option<u32>,
    ) -> Result<Vec<MemberRecord>> {
        let giveaway = self.get_giveaway(message_id)?;
        if !giveaway.has_ended() {
            let message = format!("The giveaway {message_id} hasn't ended yet.");
            return Err(Error::Giveaway(message));
        }
        if !giveaway.try_begin_roll() {
            let message = format!("A roll for the giveaway {message_id} is already in progress.");
            return Err(Error::Giveaway(message));
        }
        let result = self.reroll_giveaway(&giveaway, winner_count).await;
        giveaway.finish_roll();
        result
    }

    async fn reroll_giveaway(
        &self,
        giveaway: &Giveaway,
        winner_count: Option<u32>,
    ) -> Result<Vec<MemberRecord>> {
        let message_id = giveaway.message_id();
        if !self
            .platform
            .message_exists(giveaway.channel_id(), message_id)
            .await
        {
            self.handle_missing_message(giveaway).await;
            return Err(Error::MessageNotFound(message_id));
        }

        let count = match winner_count {
            Some(0) => {
                let message =
                    format!("The reroll of the giveaway {message_id} requires at least one winner.");
                return Err(Error::Giveaway(message));
            }
            Some(count) => count,
            None => giveaway.options().winner_count,
        };
        let winners = roll::roll(self.platform.as_ref(), &self.registry, giveaway, count).await?;
        let winner_ids: Vec<UserId> = winners.iter().map(|member| member.user_id).collect();
        giveaway.record_winners(&winner_ids);
        self.persist(giveaway).await?;

        info!(
            "The giveaway {} was rerolled with {} new winner(s)",
            message_id,
            winners.len()
        );
        self.events.giveaway_rerolled(giveaway, &winners).await;
        Ok(winners)
    }

    // Stops tracking the giveaway, cancels its timer and drops its
    // record from the store.
    pub async fn delete(&self, message_id: MessageId) -> Result<()> {
        if self.giveaways.remove(&message_id).is_none() {
            let message = format!("The requested giveaway was not found.");
            return Err(Error::Giveaway(message));
        }
        self.timers.disarm_remove(message_id);
        self.store.delete(message_id).await?;
        self.events.giveaway_deleted(message_id).await;
        info!("The giveaway {} was deleted", message_id);
        Ok(())
    }

    // Pauses the giveaway. The end timer is cancelled, so the deadline
    // can't fire while the giveaway is paused.
    pub async fn pause(&self, message_id: MessageId) -> Result<()> {
        let giveaway = self.get_giveaway(message_id)?;
        giveaway.pause_now(OffsetDateTime::now_utc())?;
        self.timers.disarm_remove(message_id);
        self.persist(&giveaway).await?;
        info!("The giveaway {} was paused", message_id);
        Ok(())
    }

    // Resumes the giveaway with the remaining time it had when it was
    // paused. The next check pass re-arms the timer if the new deadline
    // is close enough.
    pub async fn unpause(&self, message_id: MessageId) -> Result<()> {
        let giveaway = self.get_giveaway(message_id)?;
        giveaway.unpause_now(OffsetDateTime::now_utc())?;
        self.persist(&giveaway).await?;
        info!("The giveaway {} was resumed", message_id);
        Ok(())
    }

    // Reacts to a new reaction on a tracked drop giveaway: once enough
    // distinct entrants have reacted, the giveaway ends right away.
    // Reactions on anything else are ignored.
    pub async fn handle_reaction_add(&self, message_id: MessageId) -> Result<()> {
        let Some(giveaway) = self
            .giveaways
            .get(&message_id)
            .map(|entry| entry.value().clone())
        else {
            return Ok(());
        };
        if !giveaway.is_drop() || giveaway.has_ended() {
            return Ok(());
        }

        let entrants = roll::collect_entrants(self.platform.as_ref(), &giveaway).await?;
        if (entrants.len() as u32) < giveaway.options().winner_count {
            return Ok(());
        }
        match self.end(message_id).await {
            Ok(_) => Ok(()),
            Err(Error::Giveaway(reason)) => {
                debug!(
                    "The drop giveaway {} was already handled: {}",
                    message_id, reason
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    // One pass over the tracked giveaways: every running giveaway
    // whose deadline is inside the horizon gets an armed end timer.
    pub async fn check_giveaways(self: Arc<Self>) {
        let now = OffsetDateTime::now_utc();
        let giveaways = self.get_giveaways();
        for giveaway in giveaways {
            if giveaway.has_ended() || giveaway.is_paused() || giveaway.is_drop() {
                continue;
            }
            let Some(remaining) = giveaway.remaining_time(now) else {
                continue;
            };
            let message_id = giveaway.message_id();
            let scheduler = self.timers.scheduler_for(message_id);
            let manager = self.clone();
            scheduler.ensure_armed(remaining, self.horizon(), move || async move {
                manager.end_from_timer(message_id).await
            });
        }
    }

    // Spawns the periodic check loop that keeps the end timers armed.
    pub fn spawn_check_loop(self: Arc<Self>) -> JoinHandle<()> {
        let period = self
            .defaults
            .end_check_interval
            .max(Duration::seconds(1))
            .unsigned_abs();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.clone().check_giveaways().await;
            }
        })
    }

    // Cancels every pending end timer. Tracked giveaways stay in the
    // store and come back through restore on the next start.
    pub fn shutdown(&self) {
        self.timers.disarm_all();
    }

    fn horizon(&self) -> Duration {
        DEFAULT_ARM_HORIZON.max(self.defaults.end_check_interval)
    }

    // Runs the end transition for a fired timer. Outcomes that simply
    // mean somebody else got there first are no-ops.
    async fn end_from_timer(&self, message_id: MessageId) -> Result<()> {
        match self.end(message_id).await {
            Ok(_) => Ok(()),
            Err(Error::Giveaway(reason)) => {
                debug!(
                    "The end timer for the giveaway {} was a no-op: {}",
                    message_id, reason
                );
                Ok(())
            }
            Err(Error::MessageNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    // The source message is gone, so the giveaway can never be rolled
    // again: stop tracking it, drop its record and notify the host.
    async fn handle_missing_message(&self, giveaway: &Giveaway) {
        let message_id = giveaway.message_id();
        warn!(
            "Unable to fetch the giveaway message {}; removing the giveaway",
            message_id
        );
        self.timers.disarm_remove(message_id);
        self.giveaways.remove(&message_id);
        if let Err(err) = self.store.delete(message_id).await {
            error!(
                "Can't delete the giveaway {} from the store: {}",
                message_id, err
            );
        }
        self.events.giveaway_deleted(message_id).await;
    }

    async fn persist(&self, giveaway: &Giveaway) -> Result<()> {
        self.store.save(&giveaway.to_record()).await
    }
}
