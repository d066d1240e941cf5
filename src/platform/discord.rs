use std::collections::HashMap;
use std::sync::Arc;

use serenity::async_trait;
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::channel::ReactionType;
use serenity::model::guild::{Member, Role};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serenity::model::{Permissions, Timestamp};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Entrant, MemberRecord};
use crate::platform::base::ChatPlatform;

// The Discord backend: REST calls through serenity with cache lookups
// where the gateway has already filled them in.
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    bot_id: UserId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, bot_id: UserId) -> Self {
        DiscordPlatform {
            http,
            cache,
            bot_id,
        }
    }

    fn member_record(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        roles: &HashMap<RoleId, Role>,
        member: &Member,
    ) -> MemberRecord {
        MemberRecord {
            user_id: member.user.id,
            username: member.user.name.clone(),
            is_bot: member.user.bot,
            roles: member.roles.clone(),
            permissions: effective_permissions(guild_id, owner_id, roles, member),
            joined_at: member.joined_at.and_then(datetime_from_timestamp),
        }
    }
}

// Computes the guild-level permissions of a member: the @everyone role
// as the base, the member's roles OR-ed on top, with the owner and
// administrators widened to the full set.
fn effective_permissions(
    guild_id: GuildId,
    owner_id: UserId,
    roles: &HashMap<RoleId, Role>,
    member: &Member,
) -> Permissions {
    if member.user.id == owner_id {
        return Permissions::all();
    }

    // The @everyone role shares its id with the guild.
    let everyone = RoleId::new(guild_id.get());
    let mut permissions = roles
        .get(&everyone)
        .map(|role| role.permissions)
        .unwrap_or_else(Permissions::empty);
    for role_id in &member.roles {
        if let Some(role) = roles.get(role_id) {
            permissions |= role.permissions;
        }
    }

    match permissions.contains(Permissions::ADMINISTRATOR) {
        true => Permissions::all(),
        false => permissions,
    }
}

// Serenity timestamps are backed by a feature-selected datetime crate,
// so the conversion goes through the unix second.
fn datetime_from_timestamp(timestamp: Timestamp) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(timestamp.unix_timestamp()).ok()
}

// A reaction identifier the platform can't parse leaves the entrant
// list unreachable, so it surfaces as a fetch failure.
fn reaction_type_from(message_id: MessageId, reaction: &str) -> Result<ReactionType> {
    ReactionType::try_from(reaction).map_err(|_| Error::EntrantFetch {
        message_id,
        reason: format!("Can't parse the reaction identifier '{reaction}'."),
    })
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    async fn message_exists(&self, channel_id: ChannelId, message_id: MessageId) -> bool {
        self.http.get_message(channel_id, message_id).await.is_ok()
    }

    async fn fetch_reaction_page(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        reaction: &str,
        after: Option<UserId>,
    ) -> Result<Vec<Entrant>> {
        let reaction_type = reaction_type_from(message_id, reaction)?;
        let users = channel_id
            .reaction_users(
                &self.http,
                message_id,
                reaction_type,
                Some(self.reaction_page_size() as u8),
                after,
            )
            .await
            .map_err(|err| Error::EntrantFetch {
                message_id,
                reason: err.to_string(),
            })?;
        Ok(users.into_iter().map(Entrant::from).collect())
    }

    async fn resolve_member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberRecord> {
        {
            if let Some(guild) = self.cache.guild(guild_id) {
                if let Some(member) = guild.members.get(&user_id) {
                    return Some(self.member_record(
                        guild_id,
                        guild.owner_id,
                        &guild.roles,
                        member,
                    ));
                }
            }
        }

        let member = match self.http.get_member(guild_id, user_id).await {
            Ok(member) => member,
            Err(err) => {
                debug!("Can't resolve the member {} in the guild {}: {}", user_id, guild_id, err);
                return None;
            }
        };
        let (owner_id, roles) = {
            let cached = self
                .cache
                .guild(guild_id)
                .map(|guild| (guild.owner_id, guild.roles.clone()));
            match cached {
                Some(guild) => guild,
                None => match self.http.get_guild(guild_id).await {
                    Ok(guild) => (guild.owner_id, guild.roles),
                    Err(err) => {
                        debug!("Can't fetch the guild {}: {}", guild_id, err);
                        return None;
                    }
                },
            }
        };
        Some(self.member_record(guild_id, owner_id, &roles, &member))
    }
}
