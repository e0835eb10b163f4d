// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for push-channel reconnection.
//!
//! ## Disconnect simulation
//!
//! Aborting the server's accept task does not close WebSocket
//! connections that are already established (they live on their own
//! spawned tasks). Instead we place a **TCP proxy** between the client
//! and the real server. Killing the proxy aborts every proxied
//! connection task, which drops both TcpStreams and causes an immediate
//! RST on both ends — the client's WebSocket layer sees a disconnect.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use dealboard::config::{ClientConfig, ReconnectConfig};
use dealboard::sync::{self, SyncCommand, SyncEvent};
use dealboard_proto::task::TaskDraft;
use dealboard_server::store::TaskStore;

// =============================================================================
// TCP Proxy helper
// =============================================================================

/// A simple TCP proxy forwarding traffic between a client-facing port
/// and the real server. `kill()` severs every proxied connection
/// immediately.
struct TcpProxy {
    /// Address clients should connect to (`127.0.0.1:<proxy_port>`).
    client_addr: String,
    /// The acceptor task handle.
    accept_handle: tokio::task::JoinHandle<()>,
    /// All per-connection task handles. Aborting these kills the TCP streams.
    conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl TcpProxy {
    /// Create a new TCP proxy from `proxy_port` to `backend_addr`.
    async fn new(proxy_port: u16, backend_addr: &str) -> Self {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{proxy_port}"))
            .await
            .unwrap_or_else(|e| panic!("proxy: failed to bind to port {proxy_port}: {e}"));
        let bound_addr = listener.local_addr().unwrap();
        let client_addr = format!("127.0.0.1:{}", bound_addr.port());
        let backend = backend_addr.to_string();
        let conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let conn_handles_clone = Arc::clone(&conn_handles);

        let accept_handle = tokio::spawn(async move {
            loop {
                let Ok((mut client_stream, _)) = listener.accept().await else {
                    break;
                };

                let backend = backend.clone();
                let conn_handle = tokio::spawn(async move {
                    let Ok(mut backend_stream) = tokio::net::TcpStream::connect(&backend).await
                    else {
                        return;
                    };
                    // No sub-tasks here so that abort propagates and
                    // drops both streams at once.
                    let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut backend_stream)
                        .await;
                });

                conn_handles_clone.lock().push(conn_handle);
            }
        });

        Self {
            client_addr,
            accept_handle,
            conn_handles,
        }
    }

    /// Kill the proxy, severing all connections immediately.
    fn kill(self) {
        self.accept_handle.abort();
        let handles = self.conn_handles.lock();
        for h in handles.iter() {
            h.abort();
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Find a free port by binding to 0 and recording the port.
async fn find_free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to port 0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    // Brief pause to let the OS release the port.
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

async fn start_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let store = TaskStore::in_memory().expect("failed to open in-memory store");
    dealboard_server::hub::start_server("127.0.0.1:0", store)
        .await
        .expect("failed to start test server")
}

fn proxied_config(proxy_addr: &str, api_addr: std::net::SocketAddr) -> ClientConfig {
    ClientConfig {
        server_url: format!("ws://{proxy_addr}/ws"),
        api_url: format!("http://{api_addr}"),
        name: "adam".to_string(),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_attempts: 5,
        },
        log_level: "info".to_string(),
    }
}

async fn wait_for(
    rx: &mut tokio::sync::mpsc::Receiver<SyncEvent>,
    description: &str,
    pred: impl Fn(&SyncEvent) -> bool,
) -> SyncEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(evt)) if pred(&evt) => return evt,
            Ok(Some(_other)) => {}
            Ok(None) => panic!("channel closed while waiting for {description}"),
            Err(_) => break,
        }
    }
    panic!("timeout waiting for {description}");
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn reconnects_after_connection_severed() {
    let (server_addr, _server_handle) = start_server().await;

    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &server_addr.to_string()).await;
    let proxy_addr = proxy.client_addr.clone();

    let (cmd_tx, mut evt_rx, board) = sync::spawn_sync(proxied_config(&proxy_addr, server_addr)).await;
    wait_for(&mut evt_rx, "Connected", |e| matches!(e, SyncEvent::Connected)).await;

    // Sever the connection.
    proxy.kill();
    wait_for(&mut evt_rx, "Disconnected", |e| {
        matches!(e, SyncEvent::Disconnected)
    })
    .await;

    // The first re-connect attempt fails (nothing listens on the proxy
    // port) and is announced.
    let evt = wait_for(&mut evt_rx, "Reconnecting", |e| {
        matches!(e, SyncEvent::Reconnecting { .. })
    })
    .await;
    let SyncEvent::Reconnecting { attempt, .. } = evt else {
        panic!("expected Reconnecting");
    };
    assert_eq!(attempt, 1, "first attempt should be 1");

    // Restore the path on the same port; the next attempt succeeds.
    let _proxy2 = TcpProxy::new(proxy_port, &server_addr.to_string()).await;
    wait_for(&mut evt_rx, "Connected again", |e| {
        matches!(e, SyncEvent::Connected)
    })
    .await;

    // The restored session works end to end.
    cmd_tx
        .send(SyncCommand::CreateTask {
            draft: TaskDraft {
                text: "After the outage".to_string(),
                assignee: "adam".to_string(),
                ..TaskDraft::default()
            },
        })
        .await
        .unwrap();

    wait_for(&mut evt_rx, "BoardChanged with task", |_| {
        board
            .lock()
            .tasks()
            .iter()
            .any(|t| t.text == "After the outage")
    })
    .await;
}

#[tokio::test]
async fn snapshot_reloaded_on_reconnect() {
    let (server_addr, _server_handle) = start_server().await;

    let proxy_port = find_free_port().await;
    let proxy = TcpProxy::new(proxy_port, &server_addr.to_string()).await;
    let proxy_addr = proxy.client_addr.clone();

    let (_cmd_tx, mut evt_rx, board) =
        sync::spawn_sync(proxied_config(&proxy_addr, server_addr)).await;
    wait_for(&mut evt_rx, "Connected", |e| matches!(e, SyncEvent::Connected)).await;

    // A task is created while this client is partitioned away.
    proxy.kill();
    wait_for(&mut evt_rx, "Disconnected", |e| {
        matches!(e, SyncEvent::Disconnected)
    })
    .await;

    let rest = dealboard::rest::RestClient::new(&format!("http://{server_addr}"));
    rest.create_task(&TaskDraft {
        text: "Missed while away".to_string(),
        assignee: "nick".to_string(),
        ..TaskDraft::default()
    })
    .await
    .unwrap();

    // Restore the path; the reconnect snapshot must include the missed task.
    let _proxy2 = TcpProxy::new(proxy_port, &server_addr.to_string()).await;
    wait_for(&mut evt_rx, "Connected again", |e| {
        matches!(e, SyncEvent::Connected)
    })
    .await;
    wait_for(&mut evt_rx, "BoardChanged with missed task", |_| {
        board
            .lock()
            .tasks()
            .iter()
            .any(|t| t.text == "Missed while away")
    })
    .await;
}

#[tokio::test]
async fn backoff_delays_grow_linearly() {
    // No server at all: every attempt fails.
    let config = ClientConfig {
        server_url: "ws://127.0.0.1:9/ws".to_string(),
        api_url: "http://127.0.0.1:9".to_string(),
        name: "adam".to_string(),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_attempts: 4,
        },
        log_level: "info".to_string(),
    };
    let (_cmd_tx, mut evt_rx, _board) = sync::spawn_sync(config).await;

    let mut attempt_instants = Vec::new();
    for expected in 1..=3u32 {
        let evt = wait_for(&mut evt_rx, "Reconnecting", |e| {
            matches!(e, SyncEvent::Reconnecting { .. })
        })
        .await;
        attempt_instants.push(tokio::time::Instant::now());
        let SyncEvent::Reconnecting { attempt, .. } = evt else {
            panic!("expected Reconnecting");
        };
        assert_eq!(attempt, expected);
    }

    // delay = base * attempt: the gap after attempt 2 (~200ms) must
    // exceed the gap after attempt 1 (~100ms). Generous tolerance for
    // scheduling noise.
    let gap_1_to_2 = attempt_instants[1] - attempt_instants[0];
    let gap_2_to_3 = attempt_instants[2] - attempt_instants[1];
    assert!(
        gap_1_to_2 >= Duration::from_millis(80),
        "gap between attempt 1 and 2 too short: {gap_1_to_2:?}"
    );
    assert!(
        gap_2_to_3 > gap_1_to_2,
        "gap 2->3 ({gap_2_to_3:?}) should exceed gap 1->2 ({gap_1_to_2:?})"
    );

    // After the final attempt the session degrades.
    wait_for(&mut evt_rx, "Degraded", |e| matches!(e, SyncEvent::Degraded)).await;
}
