use std::sync::Arc;

use serenity::all::{Client, GatewayIntents, Http};
use tokio_util::sync::CancellationToken;
use tracing::info;

use mirror_core::{
    config::Config,
    engine::{ForwardEngine, ForwardSettings},
    fetch::{FetchConfig, HttpMediaSource, MediaFetcher},
    gateway::GatewayPort,
};

use crate::{handler::MirrorHandler, DiscordGateway};

/// Guild metadata, message events and message content.
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Wire the engine to Discord over HTTP.
pub fn build_engine(cfg: &Config) -> anyhow::Result<Arc<ForwardEngine>> {
    let http = Arc::new(Http::new(&cfg.discord_token));
    let gateway: Arc<dyn GatewayPort> = Arc::new(DiscordGateway::new(http));

    let fetcher = MediaFetcher::new(
        Arc::new(HttpMediaSource::new()?),
        FetchConfig {
            max_upload_bytes: cfg.max_upload_bytes,
            fetch_delay: cfg.fetch_delay,
        },
    );

    Ok(Arc::new(ForwardEngine::new(
        gateway,
        fetcher,
        ForwardSettings::from_config(cfg),
    )))
}

pub async fn run(
    cfg: Arc<Config>,
    engine: Arc<ForwardEngine>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        sources = engine.settings().source_channels.len(),
        target = %cfg.target_channel,
        "starting discord client"
    );

    let mut client = Client::builder(&cfg.discord_token, intents())
        .event_handler(MirrorHandler::new(engine))
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        shutdown.cancelled().await;
        info!("shutting down discord client");
        shard_manager.shutdown_all().await;
    });

    client.start().await?;
    Ok(())
}
