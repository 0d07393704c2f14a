//! Configuration types.

use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, PolicyError};
use crate::relay::commands::DEFAULT_COMMAND_PREFIX;
use crate::relay::dedup::DEFAULT_DEDUP_CAPACITY;
use crate::relay::dispatcher::DEFAULT_MAX_PENDING;
use crate::relay::matcher::KeywordPolicy;

/// Default number of forwards allowed in flight at once.
pub const DEFAULT_MAX_INFLIGHT: usize = 8;

/// Built-in keyword policy, in priority order.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "urgent",
    "dev",
    "developer",
    "scripter",
    "script",
    "pay",
    "paying",
    "hiring",
    "recruit",
    "recruiting",
    "bounty",
    "reward",
    "bug bounty",
    "vulnerability",
    "pentest",
    "penetration test",
    "security researcher",
    "ctf",
    "forensics",
    "malware analysis",
    "reverse engineering",
    "exploit",
    "looking for",
    "need help",
    "freelance",
    "contract",
    "project",
    "opportunity",
    "position",
    "job",
    "work",
    "gig",
];

/// Relay configuration, fixed at process start.
#[derive(Debug)]
pub struct RelayConfig {
    /// Discord bot token.
    pub bot_token: SecretString,
    /// Channel that receives forwards.
    pub target_channel_id: u64,
    /// Keyword policy, in priority order.
    pub keywords: Vec<String>,
    /// Dedup set ceiling.
    pub dedup_capacity: usize,
    /// Maximum concurrent sink deliveries.
    pub max_inflight: usize,
    /// Maximum delivery tasks alive at once, sending or waiting.
    pub max_pending: usize,
    /// Prefix for administrative commands.
    pub command_prefix: String,
}

impl RelayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("DISCORD_BOT_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN".into()))?;

        let target_channel_id = match lookup("TARGET_CHANNEL_ID") {
            None => return Err(ConfigError::MissingEnvVar("TARGET_CHANNEL_ID".into())),
            Some(raw) => parse_channel_id(&raw)?,
        };

        let keywords = lookup("RELAY_KEYWORDS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect());

        let dedup_capacity =
            parse_positive(&lookup, "RELAY_DEDUP_CAPACITY", DEFAULT_DEDUP_CAPACITY)?;
        let max_inflight = parse_positive(&lookup, "RELAY_MAX_INFLIGHT", DEFAULT_MAX_INFLIGHT)?;
        let max_pending = parse_positive(&lookup, "RELAY_MAX_PENDING", DEFAULT_MAX_PENDING)?;

        let command_prefix = lookup("RELAY_COMMAND_PREFIX")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.to_string());

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            target_channel_id,
            keywords,
            dedup_capacity,
            max_inflight,
            max_pending,
            command_prefix,
        })
    }

    /// Compile the configured keyword policy.
    pub fn policy(&self) -> Result<KeywordPolicy, PolicyError> {
        KeywordPolicy::new(&self.keywords)
    }

    /// Bot token in plain text, for handing to the platform client.
    pub fn token(&self) -> &str {
        self.bot_token.expose_secret()
    }
}

fn parse_channel_id(raw: &str) -> Result<u64, ConfigError> {
    let id: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: "TARGET_CHANNEL_ID".into(),
        message: format!("{e}"),
    })?;
    if id == 0 {
        return Err(ConfigError::InvalidValue {
            key: "TARGET_CHANNEL_ID".into(),
            message: "must be non-zero".into(),
        });
    }
    Ok(id)
}

fn parse_positive<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        }),
    }
}
