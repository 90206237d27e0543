use sqlx::SqliteConnection;
use tokio_stream::StreamExt;

use crate::{error::Error, message::Message};

impl Message {
    /// Persists the message. A message that already exists under the same
    /// `message_id` is left untouched, which makes redelivery after a retry
    /// invisible to readers.
    pub async fn insert(db: &mut SqliteConnection, msg: &Message) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO messages (message_id, sender_id, receiver_id, content, timestamp, read)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(&msg.message_id)
        .bind(&msg.sender_id)
        .bind(&msg.receiver_id)
        .bind(&msg.content)
        .bind(msg.timestamp)
        .bind(msg.read)
        .execute(db)
        .await?;

        Ok(())
    }

    /// All persisted messages between the two participants, in either
    /// direction, ascending by timestamp.
    pub async fn conversation(
        db: &mut SqliteConnection,
        user_a: impl AsRef<str>,
        user_b: impl AsRef<str>,
    ) -> Result<Vec<Message>, Error> {
        let mut stream = sqlx::query_as(
            "SELECT message_id, sender_id, receiver_id, content, timestamp, read
             FROM messages
             WHERE (sender_id = $1 AND receiver_id = $2)
                OR (sender_id = $2 AND receiver_id = $1)
             ORDER BY timestamp ASC",
        )
        .bind(user_a.as_ref())
        .bind(user_b.as_ref())
        .fetch(db);

        let mut messages = Vec::new();

        while let Some(res) = stream.next().await.transpose()? {
            messages.push(res);
        }

        Ok(messages)
    }

    /// Flips `read` to true. Returns the number of rows touched; zero means
    /// no such message exists.
    pub async fn mark_read(
        db: &mut SqliteConnection,
        message_id: impl AsRef<str>,
    ) -> Result<u64, Error> {
        let result = sqlx::query("UPDATE messages SET read = TRUE WHERE message_id = $1")
            .bind(message_id.as_ref())
            .execute(db)
            .await?;

        Ok(result.rows_affected())
    }
}
