//! Keyword relay pipeline.
//!
//! Every inbound guild message flows through:
//! 1. `RelayDispatcher::screen()`: self/DM filter, dedup, keyword match
//! 2. `ForwardEnvelope::build()`: enrichment for the sink
//! 3. `Sink::send()`: delivery, classified into a `DeliveryOutcome`
//!
//! Administrative commands run after the pipeline, independent of its result.

pub mod commands;
pub mod dedup;
pub mod dispatcher;
pub mod envelope;
pub mod matcher;
pub mod stats;
pub mod types;

pub use dedup::DedupTracker;
pub use dispatcher::{
    DEFAULT_MAX_PENDING, DeliveryPool, Dispatch, RelayDispatcher, Screening, SkipReason,
};
pub use envelope::{ForwardEnvelope, RenderedContent};
pub use matcher::{KeywordPolicy, match_keyword};
pub use stats::{ServerDirectory, StatsCollector, StatsSnapshot};
pub use types::{Attachment, Author, DeliveryOutcome, Message, Origin, Sink};
