//! Message types for the delivery pipeline.
//!
//! A message is the unit of work flowing through the system: it is created at
//! submission time, buffered in the durable queue, and finally persisted to
//! the store where conversation queries can see it.
//!
//! # Message Lifecycle
//!
//! 1. Submission assigns `message_id` and `timestamp`, then enqueues
//! 2. The delivery worker dequeues and persists the message
//! 3. A persisted message becomes visible to conversation queries
//!
//! Messages that fail to persist are re-enqueued and retried; they are never
//! deleted by this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// A message exchanged between two participants.
///
/// Identity and timestamp are assigned once at submission and never change.
/// `message_id` doubles as the idempotency key for delivery retries: the
/// store ignores a second insert of the same id, so at-least-once delivery
/// cannot produce duplicate visible records.
#[derive(Serialize, Deserialize, FromRow, Debug, Clone, PartialEq)]
pub struct Message {
    /// Unique identifier, assigned at submission
    pub message_id: String,
    /// Participant that sent the message
    pub sender_id: String,
    /// Participant the message is addressed to
    pub receiver_id: String,
    /// Opaque payload
    pub content: String,
    /// Creation instant (UTC); defines conversation ordering
    pub timestamp: DateTime<Utc>,
    /// Whether the receiver has marked the message as read
    pub read: bool,
}

impl Message {
    /// Builds a new message from a submission, assigning a fresh id and the
    /// current UTC instant.
    pub fn new(submission: SubmitMessage) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            sender_id: submission.sender_id,
            receiver_id: submission.receiver_id,
            content: submission.content,
            timestamp: Utc::now(),
            read: false,
        }
    }
}

/// Request body for submitting a new message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
}

/// Acknowledgment returned once a message has been accepted for delivery.
///
/// `status` is always `"queued"`: the caller is told the message was accepted,
/// not that it is yet visible to readers.
#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitReceipt {
    pub message_id: String,
    pub status: String,
}

impl SubmitReceipt {
    pub fn queued(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            status: "queued".to_owned(),
        }
    }
}

/// Response for a successful mark-as-read call.
#[derive(Serialize, Deserialize, Debug)]
pub struct ReadReceipt {
    pub status: String,
}

impl ReadReceipt {
    pub fn read() -> Self {
        Self {
            status: "read".to_owned(),
        }
    }
}
