//! Administrative chat commands.
//!
//! Parsing and rendering only. The platform adapter decides whether the caller
//! holds the required privilege before a reply is sent.

use crate::relay::envelope::{COLOR_BLUE, COLOR_GREEN, RenderedContent};
use crate::relay::matcher::KeywordPolicy;
use crate::relay::stats::StatsSnapshot;

/// Default command prefix.
pub const DEFAULT_COMMAND_PREFIX: &str = "!";

/// Commands available to server administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Show relay statistics.
    Stats,
    /// Show the keyword policy.
    Keywords,
}

impl AdminCommand {
    /// Parse a command from message text. Trailing arguments are ignored.
    pub fn parse(prefix: &str, text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix(prefix)?;
        match rest.split_whitespace().next()? {
            "stats" => Some(Self::Stats),
            "keywords" => Some(Self::Keywords),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::Keywords => "keywords",
        }
    }
}

/// Render the stats reply.
pub fn render_stats(snapshot: &StatsSnapshot) -> RenderedContent {
    RenderedContent::new(COLOR_GREEN)
        .with_title("Bot Statistics")
        .with_field("Servers", snapshot.server_count.to_string(), true)
        .with_field("Monitored Keywords", snapshot.keyword_count.to_string(), true)
        .with_field("Messages Processed", snapshot.dedup_set_size.to_string(), true)
        .with_field("Forwarded", snapshot.forwarded.to_string(), true)
}

/// Render the keyword listing reply.
pub fn render_keywords(policy: &KeywordPolicy) -> RenderedContent {
    RenderedContent::new(COLOR_BLUE)
        .with_title("Monitored Keywords")
        .with_description(policy.terms().collect::<Vec<_>>().join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(AdminCommand::parse("!", "!stats"), Some(AdminCommand::Stats));
        assert_eq!(AdminCommand::parse("!", "  !keywords now"), Some(AdminCommand::Keywords));
        assert_eq!(AdminCommand::parse("?", "?stats"), Some(AdminCommand::Stats));
    }

    #[test]
    fn rejects_other_text() {
        assert_eq!(AdminCommand::parse("!", "stats"), None);
        assert_eq!(AdminCommand::parse("!", "!statsx"), None);
        assert_eq!(AdminCommand::parse("!", "!"), None);
        assert_eq!(AdminCommand::parse("!", "!help"), None);
        assert_eq!(AdminCommand::parse("?", "!stats"), None);
    }

    #[test]
    fn stats_reply_shows_snapshot() {
        let snapshot = StatsSnapshot {
            server_count: 3,
            keyword_count: 32,
            dedup_set_size: 17,
            forwarded: 15,
            ..Default::default()
        };
        let reply = render_stats(&snapshot);
        assert_eq!(reply.title.as_deref(), Some("Bot Statistics"));
        assert_eq!(reply.color, COLOR_GREEN);
        assert_eq!(reply.field("Servers"), Some("3"));
        assert_eq!(reply.field("Monitored Keywords"), Some("32"));
        assert_eq!(reply.field("Messages Processed"), Some("17"));
    }

    #[test]
    fn keywords_reply_lists_policy_in_order() {
        let policy = KeywordPolicy::new(["urgent", "dev", "bug bounty"]).unwrap();
        let reply = render_keywords(&policy);
        assert_eq!(reply.title.as_deref(), Some("Monitored Keywords"));
        assert_eq!(reply.description.as_deref(), Some("urgent, dev, bug bounty"));
    }
}
