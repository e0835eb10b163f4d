// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for the REST surface.
//!
//! Drives a real in-process server through the [`RestClient`] (and raw
//! reqwest where the typed client cannot produce invalid input) and a
//! push-channel observer to verify the broadcast contract:
//! - created tasks come back from `GET /api/tasks` with status `todo`
//! - invalid bodies are 400 and produce no broadcast
//! - missing tasks are 404 and produce no broadcast
//! - REST mutations are broadcast to push observers (unified path)

use std::time::Duration;

use dealboard::push::PushChannel;
use dealboard::rest::{RestClient, RestError};
use dealboard_proto::event::ServerEvent;
use dealboard_proto::task::{Priority, TaskDraft, TaskId, TaskStatus};
use dealboard_server::store::TaskStore;

async fn start_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let store = TaskStore::in_memory().expect("failed to open in-memory store");
    dealboard_server::hub::start_server("127.0.0.1:0", store)
        .await
        .expect("failed to start test server")
}

fn draft(text: &str, assignee: &str) -> TaskDraft {
    TaskDraft {
        text: text.to_string(),
        assignee: assignee.to_string(),
        ..TaskDraft::default()
    }
}

/// Receive push events until one matches, skipping the rest.
async fn wait_for_push_event(
    push: &PushChannel,
    description: &str,
    pred: impl Fn(&ServerEvent) -> bool,
) -> ServerEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        let event = tokio::time::timeout(remaining, push.next_event())
            .await
            .unwrap_or_else(|_| panic!("timeout waiting for {description}"))
            .expect("push channel closed");
        if pred(&event) {
            return event;
        }
    }
    panic!("timeout waiting for {description}");
}

/// Assert that no task mutation event reaches the observer in the window.
async fn assert_no_task_events(push: &PushChannel, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, push.next_event()).await {
            Ok(Ok(event)) => {
                assert!(
                    !matches!(
                        event,
                        ServerEvent::TaskCreated { .. }
                            | ServerEvent::TaskMoved { .. }
                            | ServerEvent::TaskDeleted { .. }
                    ),
                    "unexpected task event: {event:?}"
                );
            }
            _ => return,
        }
    }
}

#[tokio::test]
async fn create_then_list_returns_matching_task() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));

    let mut d = draft("Call the Meridian buyer", "adam");
    d.priority = Some(Priority::High);
    d.deal_value = Some(45_000);
    d.task_type = Some("outreach".to_string());

    let created = client.create_task(&d).await.unwrap();
    assert_eq!(created.status, TaskStatus::Todo);
    assert_eq!(created.text, "Call the Meridian buyer");
    assert_eq!(created.assignee, "adam");
    assert_eq!(created.priority, Priority::High);
    assert_eq!(created.deal_value, 45_000);
    assert_eq!(created.task_type, "outreach");

    let tasks = client.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0], created);
}

#[tokio::test]
async fn list_is_newest_first() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));

    client.create_task(&draft("first", "adam")).await.unwrap();
    client.create_task(&draft("second", "adam")).await.unwrap();
    let third = client.create_task(&draft("third", "adam")).await.unwrap();

    let tasks = client.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0], third);
}

#[tokio::test]
async fn post_without_assignee_is_400() {
    let (addr, _handle) = start_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{addr}/api/tasks"))
        .json(&serde_json::json!({ "text": "orphaned" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_blank_text_is_400() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));

    let err = client.create_task(&draft("   ", "adam")).await.unwrap_err();
    assert!(matches!(err, RestError::Api { status: 400, .. }));
}

#[tokio::test]
async fn patch_with_invalid_status_is_400_and_silent() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));
    let observer = PushChannel::connect(&format!("ws://{addr}/ws"), "watcher")
        .await
        .unwrap();

    let task = client.create_task(&draft("steady", "adam")).await.unwrap();
    wait_for_push_event(&observer, "TaskCreated", |e| {
        matches!(e, ServerEvent::TaskCreated { .. })
    })
    .await;

    // A stage outside the enum can only be produced with raw JSON.
    let http = reqwest::Client::new();
    let resp = http
        .patch(format!("http://{addr}/api/tasks/{}", task.id))
        .json(&serde_json::json!({ "status": "archived" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    assert_no_task_events(&observer, Duration::from_millis(300)).await;

    // The stored stage is untouched.
    let tasks = client.list_tasks().await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Todo);
}

#[tokio::test]
async fn patch_with_no_recognized_field_is_400() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));
    let task = client.create_task(&draft("steady", "adam")).await.unwrap();

    let http = reqwest::Client::new();
    let resp = http
        .patch(format!("http://{addr}/api/tasks/{}", task.id))
        .json(&serde_json::json!({ "bogus": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_unknown_task_is_404() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));

    let moved = client
        .move_task(&TaskId::new(), TaskStatus::Done)
        .await
        .unwrap();
    assert!(!moved);
}

#[tokio::test]
async fn delete_unknown_task_is_404_and_silent() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));
    let observer = PushChannel::connect(&format!("ws://{addr}/ws"), "watcher")
        .await
        .unwrap();
    wait_for_push_event(&observer, "UsersUpdate", |e| {
        matches!(e, ServerEvent::UsersUpdate { .. })
    })
    .await;

    let deleted = client.delete_task(&TaskId::new()).await.unwrap();
    assert!(!deleted);

    assert_no_task_events(&observer, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn rest_mutations_broadcast_to_push_observers() {
    let (addr, _handle) = start_server().await;
    let client = RestClient::new(&format!("http://{addr}"));
    let observer = PushChannel::connect(&format!("ws://{addr}/ws"), "watcher")
        .await
        .unwrap();

    let task = client
        .create_task(&draft("From plain HTTP", "nick"))
        .await
        .unwrap();
    let event = wait_for_push_event(&observer, "TaskCreated", |e| {
        matches!(e, ServerEvent::TaskCreated { .. })
    })
    .await;
    match event {
        ServerEvent::TaskCreated { task: pushed, .. } => assert_eq!(pushed, task),
        other => panic!("expected TaskCreated, got {other:?}"),
    }

    client
        .move_task(&task.id, TaskStatus::Negotiation)
        .await
        .unwrap();
    let event = wait_for_push_event(&observer, "TaskMoved", |e| {
        matches!(e, ServerEvent::TaskMoved { .. })
    })
    .await;
    match event {
        ServerEvent::TaskMoved {
            task_id,
            new_status,
            ..
        } => {
            assert_eq!(task_id, task.id);
            assert_eq!(new_status, TaskStatus::Negotiation);
        }
        other => panic!("expected TaskMoved, got {other:?}"),
    }

    client.delete_task(&task.id).await.unwrap();
    let event = wait_for_push_event(&observer, "TaskDeleted", |e| {
        matches!(e, ServerEvent::TaskDeleted { .. })
    })
    .await;
    match event {
        ServerEvent::TaskDeleted { task_id, .. } => assert_eq!(task_id, task.id),
        other => panic!("expected TaskDeleted, got {other:?}"),
    }
}

#[tokio::test]
async fn health_endpoints_report_connections() {
    let (addr, _handle) = start_server().await;
    let _observer = PushChannel::connect(&format!("ws://{addr}/ws"), "watcher")
        .await
        .unwrap();
    // Give the server a beat to finish registering the connection.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let http = reqwest::Client::new();
    for path in ["/health", "/api/health"] {
        let body: serde_json::Value = http
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["connections"], 1, "path {path}: {body}");
        assert!(body["timestamp"].is_string());
    }
}
