//! Shared types for the relay pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::relay::envelope::RenderedContent;

// ── Inbound message ─────────────────────────────────────────────────

/// Snapshot of a chat message as seen by the relay.
///
/// The platform adapter extracts this at the boundary; the pipeline never
/// holds references into the platform client's own objects.
#[derive(Debug, Clone)]
pub struct Message {
    /// Platform message id, unique per event source.
    pub id: String,
    /// Who wrote the message.
    pub author: Author,
    /// Server and channel the message was posted in. `None` for direct messages.
    pub origin: Option<Origin>,
    /// Message body.
    pub content: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Attachments in the order the platform lists them.
    pub attachments: Vec<Attachment>,
    /// Link that jumps straight to the message.
    pub permalink: String,
}

/// Message author.
#[derive(Debug, Clone)]
pub struct Author {
    /// Stable user id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Avatar image URL, if the platform exposes one.
    pub avatar_url: Option<String>,
}

/// Where a message was posted.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    /// Server (guild) name.
    pub server: String,
    /// Channel name, without the leading `#`.
    pub channel: String,
}

/// A file attached to a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

// ── Delivery outcome ────────────────────────────────────────────────

/// Result of one attempt to forward a message to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    SinkUnavailable,
    PermissionDenied,
    TransientError(String),
}

impl DeliveryOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::SinkUnavailable => "sink_unavailable",
            Self::PermissionDenied => "permission_denied",
            Self::TransientError(_) => "transient_error",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl From<Result<(), DeliveryError>> for DeliveryOutcome {
    fn from(result: Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(DeliveryError::SinkUnavailable { .. }) => Self::SinkUnavailable,
            Err(DeliveryError::PermissionDenied { .. }) => Self::PermissionDenied,
            Err(DeliveryError::Transient { reason, .. }) => Self::TransientError(reason),
        }
    }
}

// ── Sink trait ──────────────────────────────────────────────────────

/// The single destination that receives forwarded messages.
///
/// Implementations are pure I/O. Matching, dedup and failure policy live in
/// `RelayDispatcher`.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name for logging (e.g. the channel id).
    fn name(&self) -> &str;

    /// Whether the sink exists and is reachable right now.
    async fn resolve(&self) -> bool;

    /// Send rendered content to the sink.
    async fn send(&self, content: &RenderedContent) -> Result<(), DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_delivery_errors() {
        let sink = "sink".to_string();
        assert_eq!(DeliveryOutcome::from(Ok(())), DeliveryOutcome::Delivered);
        assert_eq!(
            DeliveryOutcome::from(Err(DeliveryError::SinkUnavailable { sink: sink.clone() })),
            DeliveryOutcome::SinkUnavailable
        );
        assert_eq!(
            DeliveryOutcome::from(Err(DeliveryError::PermissionDenied { sink: sink.clone() })),
            DeliveryOutcome::PermissionDenied
        );
        assert_eq!(
            DeliveryOutcome::from(Err(DeliveryError::Transient {
                sink,
                reason: "timeout".into()
            })),
            DeliveryOutcome::TransientError("timeout".into())
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(DeliveryOutcome::Delivered.label(), "delivered");
        assert_eq!(
            DeliveryOutcome::TransientError("x".into()).label(),
            "transient_error"
        );
        assert!(DeliveryOutcome::Delivered.is_delivered());
        assert!(!DeliveryOutcome::PermissionDenied.is_delivered());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(DeliveryOutcome::TransientError("boom".into())).unwrap();
        assert_eq!(json["outcome"], "transient_error");
        assert_eq!(json["detail"], "boom");
    }
}
