use std::sync::Arc;

use keyword_relay::channels::DiscordRelay;
use keyword_relay::config::RelayConfig;
use keyword_relay::relay::{DedupTracker, DeliveryPool, RelayDispatcher, Sink, StatsCollector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export DISCORD_BOT_TOKEN=... TARGET_CHANNEL_ID=...");
        std::process::exit(1);
    });

    let policy = Arc::new(config.policy()?);

    eprintln!("Keyword Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Target channel: {}", config.target_channel_id);
    eprintln!("   Keywords: {}", policy.len());
    eprintln!("   Dedup capacity: {}", config.dedup_capacity);
    eprintln!("   Max in-flight forwards: {}", config.max_inflight);
    eprintln!("   Max pending forwards: {}", config.max_pending);
    eprintln!("   Command prefix: {}\n", config.command_prefix);

    // ── Discord connection ─────────────────────────────────────────────
    let discord = DiscordRelay::new(config.token().to_string());
    let sink: Arc<dyn Sink> = Arc::new(discord.sink(config.target_channel_id)?);

    // ── Relay pipeline ─────────────────────────────────────────────────
    let dedup = Arc::new(DedupTracker::new(config.dedup_capacity));
    let stats = Arc::new(
        StatsCollector::new(Arc::clone(&policy), Arc::clone(&dedup))
            .with_server_directory(discord.server_directory()),
    );
    let dispatcher = Arc::new(RelayDispatcher::new(policy, dedup, sink, stats));
    let deliveries = DeliveryPool::new(config.max_inflight, config.max_pending);

    tokio::select! {
        result = discord.run(
            dispatcher,
            config.target_channel_id,
            config.command_prefix.clone(),
            deliveries,
        ) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    Ok(())
}
