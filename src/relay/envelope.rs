//! Forward envelopes and the rich content they render to.

use chrono::{DateTime, Utc};

use crate::relay::types::{Attachment, Author, Message, Origin};

/// Maximum forwarded body length, in characters.
pub const MAX_BODY_CHARS: usize = 4000;

/// Maximum number of attachments listed in a forward.
pub const MAX_ATTACHMENTS: usize = 5;

/// Maximum length of one rendered field value, in characters.
pub const MAX_FIELD_CHARS: usize = 1024;

/// Accent color for forwards and the keyword listing.
pub const COLOR_BLUE: u32 = 0x3498DB;

/// Accent color for the stats block.
pub const COLOR_GREEN: u32 = 0x2ECC71;

// ── Rendered content ────────────────────────────────────────────────

/// Platform-neutral rich content block handed to a [`Sink`](crate::relay::types::Sink).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub author: Option<RenderedAuthor>,
    pub fields: Vec<RenderedField>,
    pub footer: Option<String>,
}

/// Author line of a rendered block.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

/// Labeled field of a rendered block.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl RenderedContent {
    pub fn new(color: u32) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(RenderedAuthor {
            name: name.into(),
            icon_url,
        });
        self
    }

    pub fn with_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.fields.push(RenderedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

// ── Forward envelope ────────────────────────────────────────────────

/// Everything the sink needs to show about one matched message.
#[derive(Debug, Clone)]
pub struct ForwardEnvelope {
    /// Original message id, kept for tracing a forward back to its source.
    pub message_id: String,
    pub author: Author,
    pub origin: Origin,
    pub keyword: String,
    /// Body text, hard-cut at [`MAX_BODY_CHARS`].
    pub content: String,
    pub permalink: String,
    /// At most [`MAX_ATTACHMENTS`] attachments, in original order.
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
}

impl ForwardEnvelope {
    /// Build an envelope from a matched message. Pure; no I/O.
    pub fn build(message: &Message, keyword: &str) -> Self {
        Self {
            message_id: message.id.clone(),
            author: message.author.clone(),
            origin: message.origin.clone().unwrap_or_default(),
            keyword: keyword.to_string(),
            content: truncate_chars(&message.content, MAX_BODY_CHARS),
            permalink: message.permalink.clone(),
            attachments: message
                .attachments
                .iter()
                .take(MAX_ATTACHMENTS)
                .cloned()
                .collect(),
            timestamp: message.timestamp,
        }
    }

    /// Render the envelope into a rich content block.
    pub fn render(&self) -> RenderedContent {
        let mut content = RenderedContent::new(COLOR_BLUE)
            .with_description(self.content.clone())
            .with_timestamp(self.timestamp)
            .with_author(
                format!("{} ({})", self.author.name, self.author.id),
                self.author.avatar_url.clone(),
            )
            .with_field("Server", self.origin.server.clone(), true)
            .with_field("Channel", format!("#{}", self.origin.channel), true)
            .with_field("Matched Keyword", format!("**{}**", self.keyword), true)
            .with_field(
                "Jump to Message",
                format!("[Click here]({})", self.permalink),
                false,
            );

        if let Some(summary) = self.attachment_summary() {
            content = content.with_field("Attachments", summary, false);
        }

        content.with_footer(format!("Message ID: {}", self.message_id))
    }

    /// One `[filename](url)` line per attachment, or `None` without attachments.
    ///
    /// Lines that would push the summary past [`MAX_FIELD_CHARS`] are left out,
    /// along with every line after them.
    pub fn attachment_summary(&self) -> Option<String> {
        let mut summary = String::new();
        let mut used = 0;
        for attachment in &self.attachments {
            let line = format!("[{}]({})", attachment.filename, attachment.url);
            let cost = line.chars().count() + usize::from(!summary.is_empty());
            if used + cost > MAX_FIELD_CHARS {
                break;
            }
            if !summary.is_empty() {
                summary.push('\n');
            }
            summary.push_str(&line);
            used += cost;
        }
        (!summary.is_empty()).then_some(summary)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_message(content: &str, attachments: usize) -> Message {
        Message {
            id: "1234".into(),
            author: Author {
                id: "42".into(),
                name: "alice".into(),
                avatar_url: Some("https://cdn.example/a.png".into()),
            },
            origin: Some(Origin {
                server: "Rust Guild".into(),
                channel: "jobs".into(),
            }),
            content: content.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            attachments: (0..attachments)
                .map(|i| Attachment {
                    filename: format!("file{i}.png"),
                    url: format!("https://cdn.example/file{i}.png"),
                })
                .collect(),
            permalink: "https://discord.com/channels/1/2/1234".into(),
        }
    }

    #[test]
    fn builds_full_envelope() {
        let msg = make_message("need a dev", 0);
        let env = ForwardEnvelope::build(&msg, "dev");
        assert_eq!(env.message_id, "1234");
        assert_eq!(env.keyword, "dev");
        assert_eq!(env.origin.server, "Rust Guild");
        assert_eq!(env.content, "need a dev");
        assert_eq!(env.permalink, msg.permalink);
        assert!(env.attachment_summary().is_none());
    }

    #[test]
    fn truncates_long_body_hard() {
        let long = "a".repeat(MAX_BODY_CHARS + 50);
        let env = ForwardEnvelope::build(&make_message(&long, 0), "dev");
        assert_eq!(env.content.chars().count(), MAX_BODY_CHARS);

        let exact = "b".repeat(MAX_BODY_CHARS);
        let env = ForwardEnvelope::build(&make_message(&exact, 0), "dev");
        assert_eq!(env.content, exact);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let long = "é".repeat(MAX_BODY_CHARS + 1);
        let env = ForwardEnvelope::build(&make_message(&long, 0), "dev");
        assert_eq!(env.content.chars().count(), MAX_BODY_CHARS);
    }

    #[test]
    fn lists_only_first_five_attachments() {
        let env = ForwardEnvelope::build(&make_message("dev", 8), "dev");
        assert_eq!(env.attachments.len(), MAX_ATTACHMENTS);
        let summary = env.attachment_summary().unwrap();
        assert_eq!(summary.lines().count(), MAX_ATTACHMENTS);
        assert!(summary.starts_with("[file0.png](https://cdn.example/file0.png)"));
        assert!(!summary.contains("file5.png"));
    }

    fn cdn_attachment(i: usize) -> Attachment {
        Attachment {
            filename: format!("Screenshot_2024-05-01_at_12.00.0{i}_PM_final_version.png"),
            url: format!(
                "https://cdn.discordapp.com/attachments/1234567890123456789/98765432109876543{i}/\
                 Screenshot_2024-05-01_at_12.00.0{i}_PM_final_version.png\
                 ?ex=6650a1b2&is=664f5032&hm=3f9a1c2b4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f8&"
            ),
        }
    }

    #[test]
    fn attachment_summary_fits_field_limit() {
        let mut msg = make_message("need a dev", 0);
        msg.attachments = (0..MAX_ATTACHMENTS).map(cdn_attachment).collect();
        let env = ForwardEnvelope::build(&msg, "dev");

        let naive: usize = env
            .attachments
            .iter()
            .map(|a| a.filename.len() + a.url.len() + 5)
            .sum();
        assert!(naive > MAX_FIELD_CHARS);

        let rendered = env.render();
        let summary = rendered.field("Attachments").unwrap();
        assert!(summary.chars().count() <= MAX_FIELD_CHARS);
        assert!(summary.starts_with("[Screenshot_2024-05-01_at_12.00.00"));
        assert!(summary.lines().count() < MAX_ATTACHMENTS);
        assert!(summary.lines().all(|l| l.ends_with("&)")));
    }

    #[test]
    fn oversized_single_attachment_is_left_out() {
        let mut msg = make_message("need a dev", 0);
        msg.attachments = vec![Attachment {
            filename: "a.png".into(),
            url: format!("https://cdn.example/{}", "x".repeat(MAX_FIELD_CHARS)),
        }];
        let rendered = ForwardEnvelope::build(&msg, "dev").render();
        assert!(rendered.field("Attachments").is_none());
    }

    #[test]
    fn renders_fields_in_order() {
        let env = ForwardEnvelope::build(&make_message("need a dev", 2), "dev");
        let rendered = env.render();

        assert_eq!(rendered.color, COLOR_BLUE);
        assert!(rendered.title.is_none());
        assert_eq!(rendered.description.as_deref(), Some("need a dev"));
        assert_eq!(rendered.author.as_ref().unwrap().name, "alice (42)");
        let names: Vec<_> = rendered.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Server", "Channel", "Matched Keyword", "Jump to Message", "Attachments"]
        );
        assert_eq!(rendered.field("Channel"), Some("#jobs"));
        assert_eq!(rendered.field("Matched Keyword"), Some("**dev**"));
        assert_eq!(
            rendered.field("Jump to Message"),
            Some("[Click here](https://discord.com/channels/1/2/1234)")
        );
        assert!(rendered.fields[0].inline);
        assert!(!rendered.fields[3].inline);
        assert_eq!(rendered.footer.as_deref(), Some("Message ID: 1234"));
        assert_eq!(rendered.timestamp, Some(msg_time()));
    }

    #[test]
    fn omits_attachment_field_without_attachments() {
        let rendered = ForwardEnvelope::build(&make_message("dev", 0), "dev").render();
        assert!(rendered.field("Attachments").is_none());
        assert_eq!(rendered.fields.len(), 4);
    }

    fn msg_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }
}
