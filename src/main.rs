use anyhow::Result;
use serenity::{
    http::Http,
    model::{
        gateway::GatewayIntents,
        id::{ApplicationId, GuildId},
    },
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::stream::{DirectDownload, Streamer, YtDlpStream};
use crate::audio::SessionManager;
use crate::bot::commands::Maintenance;
use crate::bot::dispatcher::Dispatcher;
use crate::bot::voice::{SerenityNotifier, SongbirdTransport};
use crate::bot::MusicBot;
use crate::config::Config;
use crate::sources::{Resolver, ScrapeSearchClient, SearchProvider, YtDlpClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guildtune=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting guildtune v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    let http = Arc::new(Http::new(&config.discord_token));
    http.set_application_id(ApplicationId::new(config.application_id));
    let guild_id = config.guild_id.map(GuildId::new);

    if let Some(action) = Maintenance::from_args(std::env::args()) {
        info!("🛠️ Running command maintenance: {:?}", action);
        return action.run(&http, guild_id).await;
    }

    // yt-dlp
    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
    match ytdlp.version().await {
        Ok(version) => info!("✅ yt-dlp {} available", version),
        Err(e) => warn!("⚠️ yt-dlp is not runnable, playback will fail: {}", e),
    }

    // Resolver
    let scrape = ScrapeSearchClient::new(config.http_timeout, ytdlp.clone())?;
    let search: Vec<Arc<dyn SearchProvider>> = vec![ytdlp.clone(), Arc::new(scrape)];
    let resolver = Arc::new(Resolver::new(ytdlp.clone(), search));

    // Streamer; no total timeout, streams stay open for the whole track
    let stream_client = reqwest::Client::builder()
        .connect_timeout(config.http_timeout)
        .build()?;
    // songbird keeps the program name for the lifetime of every input
    let ytdlp_program: &'static str = Box::leak(config.ytdlp_path.clone().into_boxed_str());
    let streamer = Arc::new(Streamer::new(
        Box::new(YtDlpStream::new(ytdlp_program, stream_client.clone())),
        Box::new(DirectDownload::new(
            ytdlp.clone(),
            stream_client,
            config.stream_buffer_bytes,
        )),
    ));

    // Sessions
    let songbird = Songbird::serenity();
    let (sessions, events) = SessionManager::new(
        Arc::new(SongbirdTransport::new(songbird.clone())),
        streamer,
        Arc::new(SerenityNotifier::new(http.clone())),
        config.session_settings(),
    );
    let sessions = Arc::new(sessions);
    tokio::spawn(sessions.clone().run(events));

    let handler = MusicBot::new(
        Dispatcher::new(resolver, sessions.clone()),
        sessions.clone(),
        guild_id,
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!(
            "⚠️ Shutdown signal received, closing with {} active queues...",
            sessions.active_guilds()
        );
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("❌ Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let version = YtDlpClient::new(config.ytdlp_path.clone()).version().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
