//! Background delivery worker.
//!
//! A single long-lived task drains the durable queue and persists each entry
//! to the store. Delivery is at-least-once: a persisted message whose queue
//! entry was not yet removed when the process died will be delivered again on
//! the next start, and the store's conflict handling keeps the second attempt
//! invisible.
//!
//! Failure handling:
//!
//! - queue transport errors pause for a fixed backoff and retry the poll
//! - malformed payloads are logged and dropped, never requeued
//! - store errors re-enqueue the message at the tail for a later attempt
//! - a failed re-enqueue is logged as message loss
//!
//! Exactly one worker should run per deployment; additional workers only
//! widen the at-least-once duplication window.

use std::time::Duration;

use snafu::ResultExt;
use sqlx::{Acquire, SqlitePool};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Error, MalformedPayloadSnafu},
    message::Message,
    queue::DeliveryQueue,
};

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub struct DeliveryWorker {
    queue: DeliveryQueue,
    db: SqlitePool,
    shutdown: watch::Receiver<bool>,
}

impl DeliveryWorker {
    pub fn new(queue: DeliveryQueue, db: SqlitePool, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            queue,
            db,
            shutdown,
        }
    }

    /// Runs until the shutdown channel flips to true. An in-flight
    /// dequeue/persist cycle always completes before the loop exits; only the
    /// idle wait is interrupted.
    pub async fn run(mut self) {
        info!("delivery worker started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.queue.try_dequeue().await {
                Ok(Some(body)) => {
                    self.deliver(&body).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "failed to poll delivery queue");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
            }

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = self.queue.ready() => {}
            }
        }

        info!("delivery worker stopped");
    }

    async fn deliver(&self, body: &[u8]) {
        // A payload that does not decode will never decode; drop it so it
        // cannot block the entries behind it.
        let msg: Message = match serde_json::from_slice(body).context(MalformedPayloadSnafu) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping malformed queue entry");
                return;
            }
        };

        match self.persist(&msg).await {
            Ok(()) => {
                debug!(message_id = %msg.message_id, "message persisted");
            }
            Err(e) => {
                warn!(
                    message_id = %msg.message_id,
                    error = %e,
                    "failed to persist message, requeueing"
                );

                if let Err(requeue_err) = self.queue.enqueue(&msg).await {
                    error!(
                        message_id = %msg.message_id,
                        error = %requeue_err,
                        "failed to requeue message, entry is lost"
                    );
                }

                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }

    async fn persist(&self, msg: &Message) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        Message::insert(tx.acquire().await?, msg).await?;

        tx.commit().await?;

        Ok(())
    }
}
