use std::time::Duration;

use outbox_relay::broker::Broker;
use outbox_relay::broker::EnqueueTask;
use outbox_relay::broker::Priority;
use serde_json::json;

use crate::helpers::spawn_app;

fn valid_body() -> serde_json::Value {
    json!({
        "from": "sender@example.com",
        "to": ["recipient@example.com"],
        "subject": "hello",
        "content": "hi there",
    })
}

#[tokio::test]
async fn mail_send_is_accepted_and_eventually_delivered() {
    let app = spawn_app().await;

    let resp = app.post_mail(valid_body()).await;
    assert!(resp.status().is_success());

    let claimed = app.run_producer_once().await.unwrap();
    assert_eq!(claimed, 1);
    assert_eq!(app.broker.pending_count(Priority::Default), 1);

    let delivered = app.run_worker_once().await;
    assert!(delivered);
    assert_eq!(app.transport.sent().len(), 1);
    assert_eq!(app.transport.sent()[0].subject, "hello");
}

#[tokio::test]
async fn invalid_sender_is_rejected_before_any_outbox_write() {
    let app = spawn_app().await;

    let mut body = valid_body();
    body["from"] = json!("not-an-email");

    let resp = app.post_mail(body).await;
    assert_eq!(resp.status().as_u16(), 400);

    let claimed = app.run_producer_once().await.unwrap();
    assert_eq!(claimed, 0);
}

#[tokio::test]
async fn producer_rolls_back_the_batch_on_broker_outage() {
    let app = spawn_app().await;

    app.post_mail(valid_body()).await;
    app.post_mail(valid_body()).await;

    app.broker.fail_next_enqueues(0);
    let result = app.run_producer_once().await;
    assert!(result.is_err());
    assert_eq!(app.broker.pending_count(Priority::Default), 0);

    // the outage clears; the same two rows are claimable again, proving the
    // failed attempt rolled its delete back rather than losing the rows.
    app.broker.clear_injected_failure();
    let claimed = app.run_producer_once().await.unwrap();
    assert_eq!(claimed, 2);
}

#[tokio::test]
async fn a_duplicate_broker_outcome_still_lets_the_batch_commit() {
    let app = spawn_app().await;
    app.post_mail(valid_body()).await;

    let outbox_id: uuid::Uuid = sqlx::query_scalar!("SELECT id FROM outbox")
        .fetch_one(&app.pool)
        .await
        .unwrap();

    // simulate a prior crash: the broker already accepted this idempotency
    // key, but the outbox delete never committed.
    app.broker
        .enqueue(EnqueueTask {
            r#type: "email:deliver".to_string(),
            payload: b"{}".to_vec(),
            idempotency_key: outbox_id.to_string(),
            retention: Duration::from_secs(600),
            priority: Priority::Default,
        })
        .await
        .unwrap();

    let claimed = app.run_producer_once().await.unwrap();
    assert_eq!(claimed, 1);

    let remaining: i64 = sqlx::query_scalar!("SELECT count(*) FROM outbox")
        .fetch_one(&app.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remaining, 0);

    // the real send was never re-queued behind the stale one
    assert_eq!(app.broker.pending_count(Priority::Default), 1);
}
