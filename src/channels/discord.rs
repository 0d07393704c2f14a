//! Discord channel: gateway ingestion and sink delivery via twilight.
//!
//! Shard runners keep the in-memory cache current and hand every relevant
//! event to one processing loop, so messages are screened in arrival order.
//! Deliveries run on spawned tasks bounded by a semaphore, keeping a slow or
//! hung HTTP call off the ingestion path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, trace, warn};

use twilight_cache_inmemory::{InMemoryCache, ResourceType};
use twilight_gateway::{Config, Event, EventTypeFlags, Intents, Shard, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_http::error::ErrorType;
use twilight_model::channel::Message as DiscordMessage;
use twilight_model::channel::message::Embed;
use twilight_model::guild::Permissions;
use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};
use twilight_model::util::{ImageHash, Timestamp};
use twilight_util::builder::embed::{
    EmbedAuthorBuilder, EmbedBuilder, EmbedFieldBuilder, EmbedFooterBuilder, ImageSource,
};

use crate::error::{ChannelError, DeliveryError};
use crate::relay::commands::{self, AdminCommand};
use crate::relay::dispatcher::{DeliveryPool, RelayDispatcher};
use crate::relay::envelope::RenderedContent;
use crate::relay::stats::ServerDirectory;
use crate::relay::types::{Attachment, Author, Message, Origin, Sink};

const CHANNEL_NAME: &str = "discord";

/// HTTP timeout for every Discord API call.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ── Sink ────────────────────────────────────────────────────────────

/// The fixed Discord channel that receives forwards.
pub struct DiscordSink {
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    channel_id: Id<ChannelMarker>,
    name: String,
}

impl DiscordSink {
    pub fn new(
        http: Arc<HttpClient>,
        cache: Arc<InMemoryCache>,
        channel_id: Id<ChannelMarker>,
    ) -> Self {
        Self {
            http,
            cache,
            channel_id,
            name: channel_id.to_string(),
        }
    }
}

#[async_trait]
impl Sink for DiscordSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self) -> bool {
        self.cache.channel(self.channel_id).is_some()
    }

    async fn send(&self, content: &RenderedContent) -> Result<(), DeliveryError> {
        let embed = to_embed(content);
        self.http
            .create_message(self.channel_id)
            .embeds(&[embed])
            .await
            .map(|_| ())
            .map_err(|e| classify_http_error(&self.name, &e))
    }
}

/// Map a twilight HTTP error onto the delivery taxonomy.
fn classify_http_error(sink: &str, err: &twilight_http::Error) -> DeliveryError {
    match err.kind() {
        ErrorType::Response { status, .. } => classify_status(sink, status.get(), err.to_string()),
        _ => DeliveryError::Transient {
            sink: sink.to_string(),
            reason: err.to_string(),
        },
    }
}

/// 403 is a permission problem, 404 means the channel is gone, anything else is transient.
pub fn classify_status(sink: &str, status: u16, detail: String) -> DeliveryError {
    match status {
        403 => DeliveryError::PermissionDenied {
            sink: sink.to_string(),
        },
        404 => DeliveryError::SinkUnavailable {
            sink: sink.to_string(),
        },
        _ => DeliveryError::Transient {
            sink: sink.to_string(),
            reason: detail,
        },
    }
}

/// Convert rendered content into a Discord embed.
pub fn to_embed(content: &RenderedContent) -> Embed {
    let mut builder = EmbedBuilder::new().color(content.color);

    if let Some(title) = &content.title {
        builder = builder.title(title.clone());
    }
    if let Some(description) = &content.description {
        builder = builder.description(description.clone());
    }
    if let Some(timestamp) = content
        .timestamp
        .and_then(|t| Timestamp::from_micros(t.timestamp_micros()).ok())
    {
        builder = builder.timestamp(timestamp);
    }
    if let Some(author) = &content.author {
        let mut author_builder = EmbedAuthorBuilder::new(author.name.clone());
        if let Some(icon) = author.icon_url.as_deref().and_then(|url| ImageSource::url(url).ok()) {
            author_builder = author_builder.icon_url(icon);
        }
        builder = builder.author(author_builder);
    }
    for field in &content.fields {
        let mut field_builder = EmbedFieldBuilder::new(field.name.clone(), field.value.clone());
        if field.inline {
            field_builder = field_builder.inline();
        }
        builder = builder.field(field_builder);
    }
    if let Some(footer) = &content.footer {
        builder = builder.footer(EmbedFooterBuilder::new(footer.clone()));
    }

    builder.build()
}

// ── Server directory ────────────────────────────────────────────────

/// Server count read from the gateway cache.
pub struct CachedGuilds(Arc<InMemoryCache>);

impl ServerDirectory for CachedGuilds {
    fn server_count(&self) -> usize {
        self.0.stats().guilds()
    }
}

// ── Message conversion ──────────────────────────────────────────────

/// Link that opens a guild message in the client.
pub fn jump_url(
    guild_id: Id<GuildMarker>,
    channel_id: Id<ChannelMarker>,
    message_id: impl std::fmt::Display,
) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
}

/// Avatar URL for a user, falling back to the default avatar.
pub fn avatar_url(user_id: Id<UserMarker>, avatar: Option<&ImageHash>) -> String {
    match avatar {
        Some(hash) => {
            let ext = if hash.is_animated() { "gif" } else { "png" };
            format!("https://cdn.discordapp.com/avatars/{user_id}/{hash}.{ext}")
        }
        None => format!(
            "https://cdn.discordapp.com/embed/avatars/{}.png",
            (user_id.get() >> 22) % 6
        ),
    }
}

/// Snapshot a twilight message into the relay's message type.
fn snapshot_message(msg: &DiscordMessage, cache: &InMemoryCache) -> Message {
    let origin = msg.guild_id.map(|guild_id| Origin {
        server: cache
            .guild(guild_id)
            .map(|g| g.name().to_string())
            .unwrap_or_else(|| guild_id.to_string()),
        channel: cache
            .channel(msg.channel_id)
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| msg.channel_id.to_string()),
    });

    let permalink = match msg.guild_id {
        Some(guild_id) => jump_url(guild_id, msg.channel_id, msg.id),
        None => format!("https://discord.com/channels/@me/{}/{}", msg.channel_id, msg.id),
    };

    Message {
        id: msg.id.to_string(),
        author: Author {
            id: msg.author.id.to_string(),
            name: msg.author.name.clone(),
            avatar_url: Some(avatar_url(msg.author.id, msg.author.avatar.as_ref())),
        },
        origin,
        content: msg.content.clone(),
        timestamp: DateTime::from_timestamp_micros(msg.timestamp.as_micros())
            .unwrap_or_else(Utc::now),
        attachments: msg
            .attachments
            .iter()
            .map(|a| Attachment {
                filename: a.filename.clone(),
                url: a.url.clone(),
            })
            .collect(),
        permalink,
    }
}

// ── Gateway runtime ─────────────────────────────────────────────────

/// Event handed from shard runners to the processing loop.
enum InboundEvent {
    Ready {
        user_id: Id<UserMarker>,
        name: String,
        guilds: usize,
    },
    Message {
        message: Message,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Id<ChannelMarker>,
        author_id: Id<UserMarker>,
        author_is_bot: bool,
    },
}

/// Discord connection: HTTP client, gateway cache and shards.
pub struct DiscordRelay {
    token: String,
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
}

impl DiscordRelay {
    pub fn new(token: String) -> Self {
        let http = Arc::new(
            HttpClient::builder()
                .token(token.clone())
                .timeout(HTTP_TIMEOUT)
                .build(),
        );
        let cache = Arc::new(
            InMemoryCache::builder()
                .resource_types(
                    ResourceType::GUILD
                        | ResourceType::CHANNEL
                        | ResourceType::ROLE
                        | ResourceType::MEMBER
                        | ResourceType::USER,
                )
                .build(),
        );
        Self { token, http, cache }
    }

    /// Sink for the given target channel, sharing this connection's client and cache.
    pub fn sink(&self, channel_id: u64) -> Result<DiscordSink, ChannelError> {
        let channel_id = Id::<ChannelMarker>::new_checked(channel_id).ok_or_else(|| {
            ChannelError::StartupFailed {
                name: CHANNEL_NAME.into(),
                reason: "target channel id must be non-zero".into(),
            }
        })?;
        Ok(DiscordSink::new(
            Arc::clone(&self.http),
            Arc::clone(&self.cache),
            channel_id,
        ))
    }

    pub fn server_directory(&self) -> Arc<dyn ServerDirectory> {
        Arc::new(CachedGuilds(Arc::clone(&self.cache)))
    }

    /// Connect and process events until every shard stops.
    pub async fn run(
        self,
        dispatcher: Arc<RelayDispatcher>,
        target_channel_id: u64,
        command_prefix: String,
        deliveries: DeliveryPool,
    ) -> crate::error::Result<()> {
        let config = Config::new(
            self.token.clone(),
            Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
        );

        let shards =
            twilight_gateway::create_recommended(&self.http, config, |_, builder| builder.build())
                .await
                .map_err(|e| ChannelError::StartupFailed {
                    name: CHANNEL_NAME.into(),
                    reason: e.to_string(),
                })?;

        let (tx, rx) = unbounded_channel();
        let mut runners = Vec::new();
        for shard in shards {
            runners.push(tokio::spawn(shard_runner(shard, tx.clone(), Arc::clone(&self.cache))));
        }
        drop(tx);

        info!(shards = runners.len(), "Discord gateway connected");

        let processor = EventProcessor {
            http: self.http,
            cache: self.cache,
            dispatcher,
            target_channel_id,
            command_prefix,
            deliveries,
        };
        processor.run(rx).await;

        Err(ChannelError::Disconnected {
            name: CHANNEL_NAME.into(),
            reason: "all gateway shards stopped".into(),
        }
        .into())
    }
}

/// Receive gateway events for one shard, update the cache and forward what matters.
async fn shard_runner(
    mut shard: Shard,
    tx: UnboundedSender<InboundEvent>,
    cache: Arc<InMemoryCache>,
) {
    let shard_id = shard.id().number();
    info!(shard_id, "Shard started");

    let flags = EventTypeFlags::READY
        | EventTypeFlags::MESSAGE_CREATE
        | EventTypeFlags::GUILD_CREATE
        | EventTypeFlags::GUILD_UPDATE
        | EventTypeFlags::GUILD_DELETE
        | EventTypeFlags::CHANNEL_CREATE
        | EventTypeFlags::CHANNEL_UPDATE
        | EventTypeFlags::CHANNEL_DELETE
        | EventTypeFlags::ROLE_CREATE
        | EventTypeFlags::ROLE_UPDATE
        | EventTypeFlags::ROLE_DELETE
        | EventTypeFlags::THREAD_CREATE
        | EventTypeFlags::THREAD_UPDATE
        | EventTypeFlags::THREAD_DELETE;

    while let Some(item) = shard.next_event(flags).await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                warn!(shard_id, error = ?e, "Error receiving gateway event");
                continue;
            }
        };

        cache.update(&event);

        let inbound = match event {
            Event::Ready(ready) => InboundEvent::Ready {
                user_id: ready.user.id,
                name: ready.user.name.clone(),
                guilds: ready.guilds.len(),
            },
            Event::MessageCreate(msg) => InboundEvent::Message {
                message: snapshot_message(&msg, &cache),
                guild_id: msg.guild_id,
                channel_id: msg.channel_id,
                author_id: msg.author.id,
                author_is_bot: msg.author.bot,
            },
            other => {
                trace!(shard_id, kind = ?other.kind(), "Cache-only event");
                continue;
            }
        };

        if tx.send(inbound).is_err() {
            break;
        }
    }

    warn!(shard_id, "Shard event loop ended");
}

/// Single consumer of inbound events.
struct EventProcessor {
    http: Arc<HttpClient>,
    cache: Arc<InMemoryCache>,
    dispatcher: Arc<RelayDispatcher>,
    target_channel_id: u64,
    command_prefix: String,
    deliveries: DeliveryPool,
}

impl EventProcessor {
    async fn run(&self, mut rx: UnboundedReceiver<InboundEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                InboundEvent::Ready { user_id, name, guilds } => {
                    self.on_ready(user_id, &name, guilds).await;
                }
                InboundEvent::Message {
                    message,
                    guild_id,
                    channel_id,
                    author_id,
                    author_is_bot,
                } => {
                    self.dispatcher.dispatch(message.clone(), &self.deliveries).await;
                    if !author_is_bot {
                        self.handle_command(&message, guild_id, channel_id, author_id).await;
                    }
                }
            }
        }
    }

    async fn on_ready(&self, user_id: Id<UserMarker>, name: &str, guilds: usize) {
        self.dispatcher.set_self_id(user_id.to_string()).await;

        let keywords = self.dispatcher.policy().terms().collect::<Vec<_>>().join(", ");
        info!(user = %name, user_id = %user_id, "Connected to Discord");
        info!(servers = guilds, "Bot is in {guilds} servers");
        info!(keywords = %keywords, "Monitoring for keywords");
        info!(channel_id = self.target_channel_id, "Forwarding to channel");

        let Some(channel_id) = Id::<ChannelMarker>::new_checked(self.target_channel_id) else {
            return;
        };
        match self.http.channel(channel_id).await {
            Ok(response) => match response.model().await {
                Ok(channel) => info!(
                    channel = channel.name.as_deref().unwrap_or_default(),
                    guild_id = ?channel.guild_id,
                    "Target channel found"
                ),
                Err(e) => warn!(error = %e, "Could not parse target channel"),
            },
            Err(e) => warn!(
                channel_id = self.target_channel_id,
                error = %e,
                "Target channel not found, check TARGET_CHANNEL_ID"
            ),
        }
    }

    async fn handle_command(
        &self,
        message: &Message,
        guild_id: Option<Id<GuildMarker>>,
        channel_id: Id<ChannelMarker>,
        author_id: Id<UserMarker>,
    ) {
        let Some(command) = AdminCommand::parse(&self.command_prefix, &message.content) else {
            return;
        };
        let Some(guild_id) = guild_id else {
            debug!(command = command.name(), "Ignoring command outside a server");
            return;
        };
        if !self.is_administrator(guild_id, author_id) {
            warn!(
                command = command.name(),
                user_id = %author_id,
                "Refusing command: caller lacks Administrator permission"
            );
            return;
        }

        let reply = match command {
            AdminCommand::Stats => {
                commands::render_stats(&self.dispatcher.stats().snapshot().await)
            }
            AdminCommand::Keywords => commands::render_keywords(self.dispatcher.policy()),
        };

        let http = Arc::clone(&self.http);
        let command_name = command.name();
        tokio::spawn(async move {
            if let Err(e) = http.create_message(channel_id).embeds(&[to_embed(&reply)]).await {
                error!(command = command_name, error = %e, "Failed to send command reply");
            }
        });
    }

    fn is_administrator(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) -> bool {
        match self.cache.permissions().root(user_id, guild_id) {
            Ok(permissions) => permissions.contains(Permissions::ADMINISTRATOR),
            Err(e) => {
                debug!(error = %e, "Could not compute permissions");
                false
            }
        }
    }
}
