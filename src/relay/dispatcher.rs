//! Relay dispatcher. Screens inbound messages and forwards matches to the sink.
//!
//! Flow per message:
//! 1. Drop our own messages and direct messages
//! 2. Drop ids already forwarded
//! 3. Keyword match against the policy
//! 4. Mark the id as forwarded (before any delivery attempt)
//! 5. Resolve the sink, build the envelope, deliver
//! 6. Classify and report the outcome
//!
//! Delivery is best-effort and at-most-once. Failures are logged and counted,
//! never retried, and never stop the dispatcher.
//!
//! [`RelayDispatcher::dispatch`] runs steps 1-4 inline and steps 5-6 on a
//! spawned task drawn from a [`DeliveryPool`], so a hung sink never stalls
//! ingestion.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::relay::dedup::DedupTracker;
use crate::relay::envelope::ForwardEnvelope;
use crate::relay::matcher::KeywordPolicy;
use crate::relay::stats::StatsCollector;
use crate::relay::types::{DeliveryOutcome, Message, Sink};

/// Why a message was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Written by the relay's own identity.
    OwnMessage,
    /// No server context (direct message).
    DirectMessage,
    /// Already forwarded.
    Duplicate,
    /// No keyword matched.
    NoMatch,
}

/// Result of screening a message (steps 1-4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Skipped(SkipReason),
    /// Matched and marked; ready to forward.
    Matched { keyword: String },
}

/// Result of the full pipeline for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Skipped(SkipReason),
    Forwarded {
        keyword: String,
        outcome: DeliveryOutcome,
    },
}

/// Default number of delivery tasks alive at once, sending or waiting to send.
pub const DEFAULT_MAX_PENDING: usize = 256;

/// Bounds background deliveries.
///
/// `sending` caps concurrent sink calls. `pending` caps spawned delivery tasks,
/// so a stuck sink cannot pile up tasks without limit.
#[derive(Clone)]
pub struct DeliveryPool {
    sending: Arc<Semaphore>,
    pending: Arc<Semaphore>,
}

impl DeliveryPool {
    pub fn new(max_inflight: usize, max_pending: usize) -> Self {
        Self {
            sending: Arc::new(Semaphore::new(max_inflight)),
            pending: Arc::new(Semaphore::new(max_pending.max(max_inflight))),
        }
    }

    /// Reserve a pending slot without waiting. `None` when the backlog is full.
    fn reserve(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.pending).try_acquire_owned().ok()
    }
}

/// Orchestrates dedup, matching, enrichment and delivery.
pub struct RelayDispatcher {
    policy: Arc<KeywordPolicy>,
    dedup: Arc<DedupTracker>,
    sink: Arc<dyn Sink>,
    stats: Arc<StatsCollector>,
    /// Our own user id, learned once the platform session is ready.
    self_id: RwLock<Option<String>>,
}

impl RelayDispatcher {
    pub fn new(
        policy: Arc<KeywordPolicy>,
        dedup: Arc<DedupTracker>,
        sink: Arc<dyn Sink>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            policy,
            dedup,
            sink,
            stats,
            self_id: RwLock::new(None),
        }
    }

    /// Record the relay's own user id so its messages are never relayed.
    pub async fn set_self_id(&self, id: impl Into<String>) {
        *self.self_id.write().await = Some(id.into());
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn policy(&self) -> &Arc<KeywordPolicy> {
        &self.policy
    }

    /// Run the whole pipeline for one inbound message.
    pub async fn on_message(&self, message: &Message) -> Dispatch {
        match self.screen(message).await {
            Screening::Skipped(reason) => Dispatch::Skipped(reason),
            Screening::Matched { keyword } => {
                let outcome = self.forward(message, &keyword).await;
                Dispatch::Forwarded { keyword, outcome }
            }
        }
    }

    /// Screen inline, then deliver on a background task from `pool`.
    ///
    /// Returns once screening is done; it never waits on the sink. A matched
    /// message that finds the backlog full is dropped and counted as a
    /// transient failure.
    pub async fn dispatch(self: &Arc<Self>, message: Message, pool: &DeliveryPool) -> Screening {
        let screening = self.screen(&message).await;
        let Screening::Matched { keyword } = &screening else {
            return screening;
        };

        let Some(pending) = pool.reserve() else {
            let outcome = DeliveryOutcome::TransientError("delivery backlog full".into());
            self.settle(&message, keyword, &outcome);
            return screening;
        };

        let dispatcher = Arc::clone(self);
        let sending = Arc::clone(&pool.sending);
        let keyword = keyword.clone();
        tokio::spawn(async move {
            let _pending = pending;
            let Ok(_permit) = sending.acquire_owned().await else {
                error!(message_id = %message.id, "Delivery pool closed, forward dropped");
                return;
            };
            dispatcher.forward(&message, &keyword).await;
        });

        screening
    }

    /// Decide whether a message should be forwarded, marking it if so.
    ///
    /// Cheap and lock-bounded; safe to run inline on the event loop.
    pub async fn screen(&self, message: &Message) -> Screening {
        if self.is_own_message(message).await {
            return Screening::Skipped(SkipReason::OwnMessage);
        }

        if message.origin.is_none() {
            debug!(message_id = %message.id, "Ignoring direct message");
            return Screening::Skipped(SkipReason::DirectMessage);
        }

        if self.dedup.seen(&message.id).await {
            debug!(message_id = %message.id, "Message already forwarded");
            return Screening::Skipped(SkipReason::Duplicate);
        }

        let Some(keyword) = self.policy.find_match(&message.content) else {
            return Screening::Skipped(SkipReason::NoMatch);
        };

        // Marking and the capacity check share one lock, so a duplicate event
        // racing past `seen` above still loses here.
        if !self.dedup.mark_and_trim(&message.id).await {
            debug!(message_id = %message.id, "Message marked concurrently");
            return Screening::Skipped(SkipReason::Duplicate);
        }

        Screening::Matched {
            keyword: keyword.to_string(),
        }
    }

    /// Deliver an already screened message to the sink and report the outcome.
    pub async fn forward(&self, message: &Message, keyword: &str) -> DeliveryOutcome {
        let outcome = if self.sink.resolve().await {
            let envelope = ForwardEnvelope::build(message, keyword);
            DeliveryOutcome::from(self.sink.send(&envelope.render()).await)
        } else {
            DeliveryOutcome::SinkUnavailable
        };

        self.settle(message, keyword, &outcome);
        outcome
    }

    fn settle(&self, message: &Message, keyword: &str, outcome: &DeliveryOutcome) {
        self.report(message, keyword, outcome);
        self.stats.record(outcome);
    }

    async fn is_own_message(&self, message: &Message) -> bool {
        self.self_id
            .read()
            .await
            .as_deref()
            .is_some_and(|id| id == message.author.id)
    }

    fn report(&self, message: &Message, keyword: &str, outcome: &DeliveryOutcome) {
        let server = message
            .origin
            .as_ref()
            .map(|o| o.server.as_str())
            .unwrap_or_default();

        match outcome {
            DeliveryOutcome::Delivered => info!(
                message_id = %message.id,
                server,
                keyword,
                "Forwarded message"
            ),
            DeliveryOutcome::SinkUnavailable => warn!(
                message_id = %message.id,
                sink = self.sink.name(),
                "Target channel not found, forward dropped"
            ),
            DeliveryOutcome::PermissionDenied => warn!(
                message_id = %message.id,
                sink = self.sink.name(),
                "No permission to send to target channel, forward dropped"
            ),
            DeliveryOutcome::TransientError(detail) => error!(
                message_id = %message.id,
                sink = self.sink.name(),
                error = %detail,
                "Error forwarding message, forward dropped"
            ),
        }
    }
}
