use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serenity::async_trait;
use serenity::client::{Client, Context, EventHandler};
use serenity::model::channel::Reaction;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::UserId;
use tracing::{error, info};

use nightsong_giveaways::{
    DiscordPlatform, GiveawayDefaults, GiveawayManager, GiveawayStorage, JsonFileStore,
};

pub struct Handler {
    loop_running: AtomicBool,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        // The gateway re-emits ready after reconnects, but the store
        // restore and the check loop must only run once per process.
        if self.loop_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = ctx
            .data
            .read()
            .await
            .get::<GiveawayStorage>()
            .cloned()
            .expect("Expected GiveawayManager in ShareMap.");

        match manager.restore().await {
            Ok(restored) => info!("Restored {} giveaway(s) from the store", restored),
            Err(err) => error!("Can't restore the stored giveaways: {}", err),
        }
        manager.spawn_check_loop();
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let manager = ctx
            .data
            .read()
            .await
            .get::<GiveawayStorage>()
            .cloned()
            .expect("Expected GiveawayManager in ShareMap.");

        if let Err(err) = manager.handle_reaction_add(reaction.message_id).await {
            error!("Can't process the reaction: {}", err);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let token = env::var("DISCORD_TOKEN").expect("Expected a DISCORD_TOKEN in the environment");
    let store_path = env::var("GIVEAWAYS_FILE").unwrap_or_else(|_| "giveaways.json".to_string());
    let intents = GatewayIntents::non_privileged();
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler {
            loop_running: AtomicBool::new(false),
        })
        .await
        .expect("Cannot create a Discord client");

    let bot_id = match client.http.get_current_application_info().await {
        Ok(info) => UserId::new(info.id.get()),
        Err(why) => panic!("Could not access application info: {:?}", why),
    };
    let platform = DiscordPlatform::new(client.http.clone(), client.cache.clone(), bot_id);
    let store = JsonFileStore::new(store_path);
    let manager = GiveawayManager::new(
        Arc::new(platform),
        Arc::new(store),
        GiveawayDefaults::default(),
    );
    {
        let mut data = client.data.write().await;
        data.insert::<GiveawayStorage>(Arc::new(manager));
    }

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }
}
