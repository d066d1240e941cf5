use std::collections::HashSet;

use serenity::model::id::UserId;
use tracing::debug;

use crate::error::Result;
use crate::models::{Entrant, Giveaway};
use crate::platform::ChatPlatform;

// Collects everyone who reacted to the giveaway message with the
// configured reaction. Pages are fetched sequentially with a cursor
// until a short or empty page signals exhaustion. The result is
// deduplicated, with bots dropped unless the giveaway allows them and
// the bot itself always dropped.
pub async fn collect_entrants(
    platform: &dyn ChatPlatform,
    giveaway: &Giveaway,
) -> Result<Vec<Entrant>> {
    let page_size = platform.reaction_page_size();
    let reaction = giveaway.options().reaction.clone();
    let mut entrants: Vec<Entrant> = Vec::new();
    let mut seen: HashSet<UserId> = HashSet::new();
    let mut after: Option<UserId> = None;

    loop {
        let page = platform
            .fetch_reaction_page(giveaway.channel_id(), giveaway.message_id(), &reaction, after)
            .await?;
        let exhausted = page.len() < page_size;
        after = page.last().map(|entrant| entrant.user_id);
        for entrant in page {
            if seen.insert(entrant.user_id) {
                entrants.push(entrant);
            }
        }
        if exhausted {
            break;
        }
    }

    let bots_can_win = giveaway.options().bots_can_win;
    let bot_id = platform.bot_user_id();
    entrants.retain(|entrant| entrant.user_id != bot_id && (!entrant.is_bot || bots_can_win));

    debug!(
        "Collected {} entrant(s) for the giveaway {}",
        entrants.len(),
        giveaway.message_id()
    );
    Ok(entrants)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serenity::async_trait;
    use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};

    use crate::config::GiveawayDefaults;
    use crate::error::{Error, Result};
    use crate::models::{Entrant, Giveaway, GiveawayRecord, MemberRecord};
    use crate::platform::ChatPlatform;
    use crate::roll::collector::collect_entrants;

    const BOT_ID: u64 = 999;

    fn get_entrant(user_id: u64) -> Entrant {
        Entrant {
            user_id: UserId::new(user_id),
            username: format!("User-{}", user_id),
            is_bot: false,
        }
    }

    fn get_bot_entrant(user_id: u64) -> Entrant {
        Entrant {
            user_id: UserId::new(user_id),
            username: format!("Bot-{}", user_id),
            is_bot: true,
        }
    }

    fn get_giveaway() -> Giveaway {
        let record = GiveawayRecord::new(
            ChannelId::new(1),
            GuildId::new(2),
            MessageId::new(3),
            "Discord Nitro",
        );
        Giveaway::from_record(&record, &GiveawayDefaults::default()).unwrap()
    }

    struct PagedPlatform {
        pages: Vec<Vec<Entrant>>,
        page_size: usize,
        calls: AtomicUsize,
        cursors: Mutex<Vec<Option<UserId>>>,
        failing: bool,
    }

    impl PagedPlatform {
        fn new(pages: Vec<Vec<Entrant>>, page_size: usize) -> Self {
            PagedPlatform {
                pages,
                page_size,
                calls: AtomicUsize::new(0),
                cursors: Mutex::new(Vec::new()),
                failing: false,
            }
        }

        fn failing() -> Self {
            let mut platform = PagedPlatform::new(Vec::new(), 100);
            platform.failing = true;
            platform
        }
    }

    #[async_trait]
    impl ChatPlatform for PagedPlatform {
        fn bot_user_id(&self) -> UserId {
            UserId::new(BOT_ID)
        }

        fn reaction_page_size(&self) -> usize {
            self.page_size
        }

        async fn message_exists(&self, _channel_id: ChannelId, _message_id: MessageId) -> bool {
            true
        }

        async fn fetch_reaction_page(
            &self,
            _channel_id: ChannelId,
            message_id: MessageId,
            _reaction: &str,
            after: Option<UserId>,
        ) -> Result<Vec<Entrant>> {
            if self.failing {
                return Err(Error::EntrantFetch {
                    message_id,
                    reason: "connection reset".to_string(),
                });
            }
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            self.cursors.lock().unwrap().push(after);
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }

        async fn resolve_member(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
        ) -> Option<MemberRecord> {
            None
        }
    }

    #[tokio::test]
    async fn test_collect_walks_pages_with_a_cursor() {
        let first_page: Vec<Entrant> = (1..=3).map(get_entrant).collect();
        let second_page: Vec<Entrant> = (4..=6).map(get_entrant).collect();
        let third_page: Vec<Entrant> = vec![get_entrant(7)];
        let platform = PagedPlatform::new(vec![first_page, second_page, third_page], 3);

        let entrants = collect_entrants(&platform, &get_giveaway()).await.unwrap();

        assert_eq!(entrants.len(), 7);
        assert_eq!(platform.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *platform.cursors.lock().unwrap(),
            vec![None, Some(UserId::new(3)), Some(UserId::new(6))]
        );
    }

    #[tokio::test]
    async fn test_collect_stops_on_a_short_page() {
        let first_page: Vec<Entrant> = (1..=2).map(get_entrant).collect();
        let platform = PagedPlatform::new(vec![first_page], 100);

        let entrants = collect_entrants(&platform, &get_giveaway()).await.unwrap();

        assert_eq!(entrants.len(), 2);
        assert_eq!(platform.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_handles_an_empty_reaction() {
        let platform = PagedPlatform::new(vec![Vec::new()], 100);

        let entrants = collect_entrants(&platform, &get_giveaway()).await.unwrap();

        assert_eq!(entrants.is_empty(), true);
        assert_eq!(platform.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_deduplicates_across_pages() {
        let first_page: Vec<Entrant> = vec![get_entrant(1), get_entrant(2)];
        let second_page: Vec<Entrant> = vec![get_entrant(2), get_entrant(3)];
        let platform = PagedPlatform::new(vec![first_page, second_page], 2);

        let entrants = collect_entrants(&platform, &get_giveaway()).await.unwrap();

        let user_ids: Vec<UserId> = entrants.iter().map(|entrant| entrant.user_id).collect();
        assert_eq!(
            user_ids,
            vec![UserId::new(1), UserId::new(2), UserId::new(3)]
        );
    }

    #[tokio::test]
    async fn test_collect_filters_bots_by_default() {
        let page = vec![get_entrant(1), get_bot_entrant(2), get_entrant(3)];
        let platform = PagedPlatform::new(vec![page], 100);

        let entrants = collect_entrants(&platform, &get_giveaway()).await.unwrap();

        let user_ids: Vec<UserId> = entrants.iter().map(|entrant| entrant.user_id).collect();
        assert_eq!(user_ids, vec![UserId::new(1), UserId::new(3)]);
    }

    #[tokio::test]
    async fn test_collect_keeps_bots_when_allowed() {
        let page = vec![get_entrant(1), get_bot_entrant(2)];
        let platform = PagedPlatform::new(vec![page], 100);
        let mut record = GiveawayRecord::new(
            ChannelId::new(1),
            GuildId::new(2),
            MessageId::new(3),
            "Discord Nitro",
        );
        record.bots_can_win = Some(true);
        let giveaway = Giveaway::from_record(&record, &GiveawayDefaults::default()).unwrap();

        let entrants = collect_entrants(&platform, &giveaway).await.unwrap();

        assert_eq!(entrants.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_always_filters_the_bot_itself() {
        let page = vec![get_entrant(1), get_bot_entrant(BOT_ID)];
        let platform = PagedPlatform::new(vec![page], 100);
        let mut record = GiveawayRecord::new(
            ChannelId::new(1),
            GuildId::new(2),
            MessageId::new(3),
            "Discord Nitro",
        );
        record.bots_can_win = Some(true);
        let giveaway = Giveaway::from_record(&record, &GiveawayDefaults::default()).unwrap();

        let entrants = collect_entrants(&platform, &giveaway).await.unwrap();

        let user_ids: Vec<UserId> = entrants.iter().map(|entrant| entrant.user_id).collect();
        assert_eq!(user_ids, vec![UserId::new(1)]);
    }

    #[tokio::test]
    async fn test_collect_propagates_fetch_failures() {
        let platform = PagedPlatform::failing();

        let result = collect_entrants(&platform, &get_giveaway()).await;

        assert_eq!(
            result,
            Err(Error::EntrantFetch {
                message_id: MessageId::new(3),
                reason: "connection reset".to_string(),
            })
        );
    }
}
