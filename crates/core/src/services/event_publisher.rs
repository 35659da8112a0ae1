//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time poll events.
//! The actual implementation is provided by the API layer
//! (in-process broadcast channels feeding WebSocket and SSE clients).

use async_trait::async_trait;
use pollo_common::AppResult;
use serde::Serialize;
use std::sync::Arc;

/// Per-option vote count, as carried by a `voteCast` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub option_id: String,
    pub vote_count: i32,
}

/// Trait for publishing real-time events.
///
/// This allows the core services to publish events
/// without directly depending on the streaming implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a vote-cast event carrying the poll's updated tally.
    async fn publish_vote_cast(
        &self,
        poll_id: &str,
        tally: &[OptionTally],
        total_votes: i32,
    ) -> AppResult<()>;

    /// Publish a poll opened/closed event.
    async fn publish_poll_state_changed(&self, poll_id: &str, is_open: bool) -> AppResult<()>;

    /// Publish a poll deleted event.
    async fn publish_poll_deleted(&self, poll_id: &str) -> AppResult<()>;
}

/// A no-op implementation of `EventPublisher` for testing or when real-time events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_vote_cast(
        &self,
        _poll_id: &str,
        _tally: &[OptionTally],
        _total_votes: i32,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn publish_poll_state_changed(&self, _poll_id: &str, _is_open: bool) -> AppResult<()> {
        Ok(())
    }

    async fn publish_poll_deleted(&self, _poll_id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed `EventPublisher` trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;
