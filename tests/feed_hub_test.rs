use chrono::Utc;
use gradebook_backend::models::live_event::LiveAnswerEvent;
use gradebook_backend::services::feed_hub::{FeedHub, FeedScope, FeedUpdate};
use serde_json::json;
use std::time::Duration;

fn event(class_id: &str, content_id: &str, student_id: &str, problem_index: i32) -> LiveAnswerEvent {
    LiveAnswerEvent {
        student_id: student_id.to_string(),
        student_name: format!("Student {}", student_id),
        class_id: class_id.to_string(),
        content_id: content_id.to_string(),
        problem_index,
        question_text: "2 + 2?".to_string(),
        answer: "4".to_string(),
        answer_type: "text".to_string(),
        correct: Some(true),
        partial_credit: None,
        score: 1.0,
        problem_points: 1.0,
        timestamp: Utc::now(),
    }
}

fn snapshot(update: Option<FeedUpdate>) -> serde_json::Value {
    match update {
        Some(FeedUpdate::Snapshot(value)) => value,
        other => panic!("expected snapshot, got {:?}", other),
    }
}

#[test]
fn subscribers_start_with_the_current_snapshot() {
    let hub = FeedHub::new();
    hub.publish(&event("c1", "q1", "s1", 0)).unwrap();

    let mut sub = hub.subscribe(&FeedScope::new("c1", Some("q1".to_string())));

    let value = snapshot(sub.try_next());
    assert_eq!(value["s1"]["0"]["answer"], json!("4"));
    assert!(sub.try_next().is_none());
}

#[test]
fn empty_scopes_start_with_an_empty_object() {
    let hub = FeedHub::new();
    let mut sub = hub.subscribe(&FeedScope::new("c9", None));
    assert_eq!(snapshot(sub.try_next()), json!({}));
}

#[test]
fn writes_only_reach_overlapping_scopes() {
    let hub = FeedHub::new();
    let mut class_sub = hub.subscribe(&FeedScope::new("c1", None));
    let mut q1_sub = hub.subscribe(&FeedScope::new("c1", Some("q1".to_string())));
    let mut other_class = hub.subscribe(&FeedScope::new("c2", None));
    for sub in [&mut class_sub, &mut q1_sub, &mut other_class] {
        sub.try_next();
    }

    hub.publish(&event("c1", "q2", "s1", 0)).unwrap();

    let class_view = snapshot(class_sub.try_next());
    assert!(class_view.get("q2").is_some());
    assert!(q1_sub.try_next().is_none());
    assert!(other_class.try_next().is_none());
}

#[test]
fn dropping_a_subscription_deregisters_it() {
    let hub = FeedHub::new();
    let first = hub.subscribe(&FeedScope::new("c1", None));
    let second = hub.subscribe(&FeedScope::new("c1", None));
    assert_eq!(hub.listener_count(), 2);

    drop(first);
    assert_eq!(hub.listener_count(), 1);
    drop(second);
    assert_eq!(hub.listener_count(), 0);

    hub.publish(&event("c1", "q1", "s1", 0)).unwrap();
    assert_eq!(hub.listener_count(), 0);
}

#[test]
fn revoke_ends_the_subscription_with_an_error() {
    let hub = FeedHub::new();
    let mut sub = hub.subscribe(&FeedScope::new("c1", Some("q1".to_string())));
    let mut other = hub.subscribe(&FeedScope::new("c2", None));
    sub.try_next();
    other.try_next();

    hub.revoke(&["c1".to_string()], "permission denied");
    assert_eq!(hub.listener_count(), 1);

    hub.publish_raw(
        &["c1".into(), "q1".into(), "s1".into(), "0".into()],
        json!({"answer": "secret"}),
    );

    assert_eq!(
        sub.try_next(),
        Some(FeedUpdate::Error("permission denied".to_string()))
    );
    assert!(sub.try_next().is_none());
    assert!(other.try_next().is_none());
}

#[tokio::test]
async fn revoked_subscriptions_close_after_the_error() {
    let hub = FeedHub::new();
    let mut sub = hub.subscribe(&FeedScope::new("c1", None));
    sub.next().await;

    hub.revoke(&["c1".to_string()], "permission denied");
    hub.publish(&event("c1", "q1", "s1", 0)).unwrap();

    assert!(matches!(sub.next().await, Some(FeedUpdate::Error(_))));
    assert!(sub.next().await.is_none());
    assert_eq!(hub.listener_count(), 0);
}

#[test]
fn raw_writes_replace_non_object_parents() {
    let hub = FeedHub::new();
    hub.publish_raw(&["c1".to_string(), "q1".to_string()], json!("garbage"));
    hub.publish(&event("c1", "q1", "s1", 2)).unwrap();

    let value = hub.snapshot(&FeedScope::new("c1", Some("q1".to_string())));
    assert_eq!(value["s1"]["2"]["student_id"], json!("s1"));
}

#[tokio::test]
async fn next_waits_for_published_updates() {
    let hub = FeedHub::new();
    let mut sub = hub.subscribe(&FeedScope::new("c1", None));
    sub.next().await;

    let publisher = hub.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish(&event("c1", "q1", "s3", 0)).unwrap();
    });

    let update = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("update within timeout");
    let value = snapshot(update);
    assert_eq!(value["q1"]["s3"]["0"]["student_name"], json!("Student s3"));
}
