// Integration tests for the websocket feed client against a real axum server

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use presence_monitor::app::{AppEvent, MonitorContext};
use presence_monitor::config::MonitorConfig;
use presence_monitor::connection::{ConnectionState, Transport, TransportEvent, WsTransport};
use presence_monitor::protocol::{InboundMessage, OutboundFrame, ServerCommand};
use presence_monitor::render::TracingSink;
use presence_monitor::timer::{Now, TokioScheduler};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const INITIAL_STATE: &str = r#"{
    "type": "INITIAL_STATE",
    "payload": [
        {"vrcUid": "usr_a", "hrToken": "Alice", "user": {"state": "offline"}},
        {"vrcUid": "usr_b", "hrToken": "Bob", "user": {"state": "online"}}
    ],
    "metadata": {"serverStartTime": 1700000000000}
}"#;

async fn feed(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(serve_feed)
}

/// Answers REFRESH with a snapshot and closes on a shutdown command
async fn serve_feed(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        if text == "REFRESH" {
            if socket
                .send(Message::Text(INITIAL_STATE.to_string()))
                .await
                .is_err()
            {
                break;
            }
        } else if text.contains("SHUTDOWN") {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "server shutting down".into(),
                })))
                .await;
            break;
        }
    }
}

async fn spawn_feed_server() -> SocketAddr {
    let app = Router::new().route("/ws/status", get(feed));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn next_event<E>(rx: &mut mpsc::UnboundedReceiver<E>) -> E {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_transport_round_trip() {
    let addr = spawn_feed_server().await;
    let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
    let mut transport = WsTransport::new(format!("ws://{}/ws/status", addr), tx);

    let id = transport.open();
    assert_eq!(next_event(&mut rx).await, TransportEvent::Opened { id });

    transport.send(OutboundFrame::Refresh).unwrap();
    let TransportEvent::Frame { id: frame_id, text } = next_event(&mut rx).await else {
        panic!("expected a frame");
    };
    assert_eq!(frame_id, id);
    match InboundMessage::parse(&text).unwrap() {
        InboundMessage::InitialState { entities, .. } => assert_eq!(entities.len(), 2),
        other => panic!("unexpected message: {:?}", other),
    }

    transport
        .send(OutboundFrame::Command(ServerCommand::Shutdown))
        .unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Closed {
            id,
            code: 1001,
            reason: "server shutting down".to_string(),
        }
    );
}

#[tokio::test]
async fn test_refused_connection_reports_error_then_close() {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel::<TransportEvent>();
    let mut transport = WsTransport::new(format!("ws://{}/ws/status", addr), tx);
    let id = transport.open();

    assert!(matches!(
        next_event(&mut rx).await,
        TransportEvent::Errored { id: errored, .. } if errored == id
    ));
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Closed {
            id,
            code: 1006,
            reason: String::new(),
        }
    );
}

#[tokio::test]
async fn test_send_without_connection_fails() {
    let (tx, _rx) = mpsc::unbounded_channel::<TransportEvent>();
    let mut transport = WsTransport::new("ws://127.0.0.1:1/ws/status", tx);
    assert!(transport.send(OutboundFrame::Refresh).is_err());
}

#[tokio::test]
async fn test_context_loads_initial_state_from_server() {
    let addr = spawn_feed_server().await;
    let mut config = MonitorConfig::default();
    config.feed.host = addr.to_string();

    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();
    let transport = WsTransport::new(config.feed.ws_url(), tx.clone());
    let timers = TokioScheduler::new(tx.clone());
    let mut ctx = MonitorContext::new(&config, transport, timers, TracingSink, Now::current());
    ctx.start(Now::current());

    while ctx.store().len() < 2 {
        let event = next_event(&mut rx).await;
        ctx.handle(event, Now::current());
    }

    assert_eq!(ctx.connection().state(), ConnectionState::Open);
    assert_eq!(ctx.status_message(), "Operational");
    let ids: Vec<_> = ctx
        .store()
        .sorted()
        .into_iter()
        .map(|entry| entry.id.as_str().to_string())
        .collect();
    assert_eq!(ids, vec!["usr_b", "usr_a"]);

    ctx.teardown();
}
