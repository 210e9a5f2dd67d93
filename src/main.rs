use analyst::command_cache::CommandCache;
use analyst::logs::{ArchiveStore, SyncRegistry};
use analyst::{commands, config::Config, sweeper, Data};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);
    let discord_token = config.discord_token.clone();
    let owners = config
        .owners()
        .into_iter()
        .map(serenity::UserId::new)
        .collect();

    let registry = Arc::new(SyncRegistry::new());
    let store = Arc::new(ArchiveStore::new(config.store_config(), registry));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            owners,
            skip_checks_for_owners: true,
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::GuildDelete { incomplete, .. } = event {
                        // Unavailable guilds are outages, not departures.
                        if !incomplete.unavailable {
                            match data.store.remove(incomplete.id.get()).await {
                                Ok(true) => info!("Left guild {}, archive removed", incomplete.id),
                                Ok(false) => {}
                                Err(e) => warn!("Failed to remove archive of guild {}: {}", incomplete.id, e),
                            }
                        }
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                match config.dev_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?
                    }
                }

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let cache = Arc::clone(&ctx.cache);
                tokio::spawn(sweeper::start_sweep_task(
                    Arc::clone(&store),
                    config.archive_sweep_interval_secs,
                    move || cache.guilds().into_iter().map(|g| g.get()).collect::<HashSet<u64>>(),
                ));

                let command_cache = CommandCache::new(config.command_cache_capacity);
                Ok(Data {
                    config,
                    store,
                    command_cache,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
