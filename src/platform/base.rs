use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

use crate::error::Result;
use crate::models::{Entrant, MemberRecord};

// The largest page the reaction endpoint can return in one request.
pub const REACTION_PAGE_SIZE: usize = 100;

// The narrow slice of the chat backend the engine needs: reaction
// pages, message existence and member lookups. The manager receives an
// implementation at construction, which keeps the engine testable
// without a gateway connection.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    // Returns the identity of the bot itself, which never wins.
    fn bot_user_id(&self) -> UserId;

    fn reaction_page_size(&self) -> usize {
        REACTION_PAGE_SIZE
    }

    // Checks that the giveaway message still exists.
    async fn message_exists(&self, channel_id: ChannelId, message_id: MessageId) -> bool;

    // Returns one page of users who reacted with the given reaction,
    // starting after the given user id.
    async fn fetch_reaction_page(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        reaction: &str,
        after: Option<UserId>,
    ) -> Result<Vec<Entrant>>;

    // Resolves a user into a guild member. Returns None when the user
    // can't be resolved, which makes them ineligible to win.
    async fn resolve_member(&self, guild_id: GuildId, user_id: UserId) -> Option<MemberRecord>;
}
