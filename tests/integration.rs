use std::ops::Deref;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use courier::{
    config::Config,
    error::Error,
    message::{Message, SubmitMessage},
    service::Service,
    worker::DeliveryWorker,
};
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct TmpService {
    svc: Service,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
    #[allow(unused)]
    tmpdir: TempDir,
}

impl Deref for TmpService {
    type Target = Service;

    fn deref(&self) -> &Self::Target {
        &self.svc
    }
}

impl TmpService {
    async fn stop_worker(&mut self) {
        self.shutdown.send(true).ok();

        if let Some(handle) = self.worker.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker exits after shutdown signal")
                .unwrap();
        }
    }
}

async fn setup() -> TmpService {
    let path = tempfile::tempdir().unwrap();

    let svc = Service::connect_with(Config {
        db_path: Some(path.path().join("courier.db").to_string_lossy().to_string()),
        host: None,
        port: None,
    })
    .await
    .unwrap();

    let (shutdown, shutdown_rx) = watch::channel(false);

    let worker = DeliveryWorker::new(svc.queue().clone(), svc.db().clone(), shutdown_rx);
    let worker = tokio::spawn(worker.run());

    TmpService {
        svc,
        shutdown,
        worker: Some(worker),
        tmpdir: path,
    }
}

fn submission(sender: &str, receiver: &str, content: &str) -> SubmitMessage {
    SubmitMessage {
        sender_id: sender.to_owned(),
        receiver_id: receiver.to_owned(),
        content: content.to_owned(),
    }
}

fn handcrafted(id: &str, sender: &str, receiver: &str, content: &str) -> Message {
    Message {
        message_id: id.to_owned(),
        sender_id: sender.to_owned(),
        receiver_id: receiver.to_owned(),
        content: content.to_owned(),
        timestamp: Utc::now(),
        read: false,
    }
}

async fn wait_for_messages(svc: &Service, a: &str, b: &str, count: usize) -> Vec<Message> {
    for _ in 0..500 {
        let messages = svc.get_conversation(a, b).await.unwrap();
        if messages.len() >= count {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("timed out waiting for {count} message(s) between {a} and {b}");
}

#[tokio::test]
async fn submitted_message_becomes_visible() {
    let service = setup().await;

    let receipt = service
        .submit_message(submission("u1", "u2", "hi"))
        .await
        .unwrap();
    assert_eq!(receipt.status, "queued");

    let messages = wait_for_messages(&service, "u1", "u2", 1).await;
    assert_eq!(messages.len(), 1);

    let msg = &messages[0];
    assert_eq!(msg.message_id, receipt.message_id);
    assert_eq!(msg.sender_id, "u1");
    assert_eq!(msg.receiver_id, "u2");
    assert_eq!(msg.content, "hi");
    assert!(!msg.read);
}

#[tokio::test]
async fn submission_requires_all_fields() {
    let service = setup().await;

    let err = service
        .submit_message(submission("u1", "", "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingParameter { .. }));

    // a rejected submission never reaches the queue
    assert_eq!(service.queue().depth().await.unwrap(), 0);
}

#[tokio::test]
async fn conversation_is_ordered_by_timestamp() {
    let service = setup().await;

    let mut older = handcrafted("ord-1", "u1", "u2", "first");
    older.timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    let mut newer = handcrafted("ord-2", "u2", "u1", "second");
    newer.timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 1).unwrap();

    // enqueue the newer message first; read order must still follow timestamps
    service.queue().enqueue(&newer).await.unwrap();
    service.queue().enqueue(&older).await.unwrap();

    let messages = wait_for_messages(&service, "u1", "u2", 2).await;
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[tokio::test]
async fn conversation_is_symmetric() {
    let service = setup().await;

    service
        .submit_message(submission("alice", "bob", "ping"))
        .await
        .unwrap();
    service
        .submit_message(submission("bob", "alice", "pong"))
        .await
        .unwrap();

    let forward = wait_for_messages(&service, "alice", "bob", 2).await;
    let reverse = service.get_conversation("bob", "alice").await.unwrap();

    assert_eq!(forward, reverse);
}

#[tokio::test]
async fn conversation_is_empty_for_strangers() {
    let service = setup().await;

    let messages = service.get_conversation("nobody", "noone").await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let service = setup().await;

    let receipt = service
        .submit_message(submission("u1", "u2", "hi"))
        .await
        .unwrap();
    wait_for_messages(&service, "u1", "u2", 1).await;

    service.mark_read(&receipt.message_id).await.unwrap();
    service.mark_read(&receipt.message_id).await.unwrap();

    let messages = service.get_conversation("u1", "u2").await.unwrap();
    assert!(messages[0].read);
}

#[tokio::test]
async fn mark_read_reports_unknown_id() {
    let service = setup().await;

    let err = service.mark_read("no-such-id").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn malformed_queue_entry_does_not_block_delivery() {
    let service = setup().await;

    sqlx::query("INSERT INTO delivery_queue (body) VALUES ($1)")
        .bind(&b"not json"[..])
        .execute(service.db())
        .await
        .unwrap();

    service
        .submit_message(submission("u1", "u2", "after garbage"))
        .await
        .unwrap();

    let messages = wait_for_messages(&service, "u1", "u2", 1).await;
    assert_eq!(messages[0].content, "after garbage");

    // the corrupted entry was dropped, not requeued
    assert_eq!(service.queue().depth().await.unwrap(), 0);
}

#[tokio::test]
async fn delivery_retries_until_store_recovers() {
    let service = setup().await;

    sqlx::query("DROP TABLE messages")
        .execute(service.db())
        .await
        .unwrap();

    service
        .submit_message(submission("u1", "u2", "delayed"))
        .await
        .unwrap();

    // let at least one delivery attempt fail and requeue
    tokio::time::sleep(Duration::from_millis(300)).await;

    sqlx::query(
        "CREATE TABLE messages (
            message_id  TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL,
            receiver_id TEXT NOT NULL,
            content     TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            read        BOOLEAN NOT NULL DEFAULT FALSE
        )",
    )
    .execute(service.db())
    .await
    .unwrap();

    let messages = wait_for_messages(&service, "u1", "u2", 1).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "delayed");
}

#[tokio::test]
async fn duplicate_delivery_stays_invisible() {
    let service = setup().await;

    let msg = handcrafted("dup-1", "u1", "u2", "once");

    service.queue().enqueue(&msg).await.unwrap();
    service.queue().enqueue(&msg).await.unwrap();

    wait_for_messages(&service, "u1", "u2", 1).await;

    // give the second entry time to drain as well
    for _ in 0..500 {
        if service.queue().depth().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let messages = service.get_conversation("u1", "u2").await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn queue_is_fifo() {
    let mut service = setup().await;
    service.stop_worker().await;

    for content in ["a", "b", "c"] {
        let msg = handcrafted(&format!("fifo-{content}"), "u1", "u2", content);
        service.queue().enqueue(&msg).await.unwrap();
    }

    for expected in ["a", "b", "c"] {
        let body = service
            .queue()
            .dequeue_blocking(Some(Duration::from_secs(1)))
            .await
            .unwrap()
            .expect("entry available");
        let msg: Message = serde_json::from_slice(&body).unwrap();
        assert_eq!(msg.content, expected);
    }
}

#[tokio::test]
async fn dequeue_times_out_on_empty_queue() {
    let mut service = setup().await;
    service.stop_worker().await;

    let body = service
        .queue()
        .dequeue_blocking(Some(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(body.is_none());
}

#[tokio::test]
async fn enqueue_wakes_blocked_dequeue() {
    let mut service = setup().await;
    service.stop_worker().await;

    let queue = service.queue().clone();
    let waiter =
        tokio::spawn(async move { queue.dequeue_blocking(Some(Duration::from_secs(5))).await });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let msg = handcrafted("wake-1", "u1", "u2", "knock");
    service.queue().enqueue(&msg).await.unwrap();

    let body = waiter.await.unwrap().unwrap().expect("entry available");
    let got: Message = serde_json::from_slice(&body).unwrap();
    assert_eq!(got, msg);
}

#[tokio::test]
async fn queued_entries_survive_restart() {
    let tmpdir = tempfile::tempdir().unwrap();
    let db_path = tmpdir.path().join("courier.db").to_string_lossy().to_string();

    let config = Config {
        db_path: Some(db_path),
        host: None,
        port: None,
    };

    let msg = handcrafted("boot-1", "u1", "u2", "hello again");

    {
        let svc = Service::connect_with(config.clone()).await.unwrap();
        svc.queue().enqueue(&msg).await.unwrap();
    }

    // a fresh process drains what the previous one left behind
    let svc = Service::connect_with(config).await.unwrap();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let worker = DeliveryWorker::new(svc.queue().clone(), svc.db().clone(), shutdown_rx);
    let handle = tokio::spawn(worker.run());

    let messages = wait_for_messages(&svc, "u1", "u2", 1).await;
    assert_eq!(messages[0].message_id, "boot-1");

    shutdown.send(true).ok();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker exits after shutdown signal")
        .unwrap();
}

#[tokio::test]
async fn worker_stops_on_shutdown_signal() {
    let mut service = setup().await;

    service
        .submit_message(submission("u1", "u2", "last words"))
        .await
        .unwrap();
    wait_for_messages(&service, "u1", "u2", 1).await;

    service.stop_worker().await;
}
