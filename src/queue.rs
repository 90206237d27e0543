//! Durable FIFO queue buffering submitted messages until delivery.
//!
//! Entries live in the `delivery_queue` table, so anything enqueued survives
//! a crash and is drained by the worker on the next start. The wire format is
//! the JSON encoding of the full [`Message`] record.

use std::{sync::Arc, time::Duration};

use sqlx::{Acquire, SqlitePool};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{error::Error, message::Message};

#[derive(Clone)]
pub struct DeliveryQueue {
    db: SqlitePool,
    ready: Arc<Notify>,
}

impl DeliveryQueue {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            ready: Arc::new(Notify::new()),
        }
    }

    /// Serializes the message and appends it to the tail of the queue.
    ///
    /// Safe to call concurrently from any number of submitters.
    pub async fn enqueue(&self, message: &Message) -> Result<(), Error> {
        let body = serde_json::to_vec(message).map_err(Error::internal)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("INSERT INTO delivery_queue (body) VALUES ($1)")
            .bind(&body)
            .execute(tx.acquire().await?)
            .await?;

        tx.commit().await?;

        self.ready.notify_one();

        Ok(())
    }

    /// Removes and returns the head entry, or `None` when the queue is empty.
    pub async fn try_dequeue(&self) -> Result<Option<Vec<u8>>, Error> {
        let body = sqlx::query_scalar(
            "DELETE FROM delivery_queue
             WHERE seq = (SELECT MIN(seq) FROM delivery_queue)
             RETURNING body",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(body)
    }

    /// Removes and returns the head entry, waiting until one is available or
    /// the timeout elapses. `None` as timeout means wait indefinitely.
    pub async fn dequeue_blocking(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(body) = self.try_dequeue().await? {
                return Ok(Some(body));
            }

            match deadline {
                None => self.ready.notified().await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, self.ready.notified())
                        .await
                        .is_err()
                    {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Resolves once an enqueue has signalled new work. The notification
    /// carries a permit, so a signal sent before the wait is not lost.
    pub async fn ready(&self) {
        self.ready.notified().await
    }

    /// Number of entries currently waiting for delivery.
    pub async fn depth(&self) -> Result<u64, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delivery_queue")
            .fetch_one(&self.db)
            .await?;

        Ok(count as u64)
    }
}
