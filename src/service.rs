use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    Acquire, SqlitePool,
};

use crate::{
    config::Config,
    error::Error,
    message::{Message, SubmitMessage, SubmitReceipt},
    queue::DeliveryQueue,
};

/// Shared application state: the store pool and the durable queue, both
/// constructed once at startup and handed to the HTTP handlers and the
/// delivery worker.
pub struct Service {
    db: SqlitePool,
    queue: DeliveryQueue,
    config: Config,
}

impl Service {
    pub async fn connect() -> eyre::Result<Self> {
        Self::connect_with(Config::default()).await
    }

    pub async fn connect_with(config: Config) -> eyre::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(config.db_path())
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .locking_mode(SqliteLockingMode::Normal)
            .optimize_on_close(true, None)
            .auto_vacuum(SqliteAutoVacuum::Full);

        let pool = SqlitePoolOptions::new().connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            queue: DeliveryQueue::new(pool.clone()),
            db: pool,
            config,
        })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accepts a message for delivery: validates the submission, assigns
    /// identity and timestamp, and enqueues it. Returns as soon as the entry
    /// is durable in the queue; persistence to the store happens later on the
    /// worker. An enqueue failure is surfaced to the caller and nothing is
    /// retained.
    pub async fn submit_message(&self, submission: SubmitMessage) -> Result<SubmitReceipt, Error> {
        for (field, value) in [
            ("sender_id", &submission.sender_id),
            ("receiver_id", &submission.receiver_id),
            ("content", &submission.content),
        ] {
            if value.is_empty() {
                return Err(Error::missing_parameter(field));
            }
        }

        let msg = Message::new(submission);

        self.queue.enqueue(&msg).await?;

        Ok(SubmitReceipt::queued(msg.message_id))
    }

    /// Already-delivered messages between the two participants, ascending by
    /// timestamp. Queued-but-undelivered messages are not included.
    pub async fn get_conversation(
        &self,
        user_a: impl AsRef<str>,
        user_b: impl AsRef<str>,
    ) -> Result<Vec<Message>, Error> {
        let mut conn = self.db.acquire().await?;

        Message::conversation(conn.acquire().await?, user_a, user_b).await
    }

    /// Marks a message as read. Idempotent; unknown ids are reported as
    /// not-found rather than a store error.
    pub async fn mark_read(&self, message_id: impl AsRef<str>) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;

        let affected = Message::mark_read(tx.acquire().await?, message_id.as_ref()).await?;

        tx.commit().await?;

        if affected == 0 {
            return Err(Error::message_not_found(message_id.as_ref()));
        }

        Ok(())
    }
}
