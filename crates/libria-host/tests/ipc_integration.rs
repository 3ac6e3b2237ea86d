//! Integration tests for the host IPC server.
//!
//! Each test plays a UI process over a raw `TcpStream`, framing messages with
//! the shared codec, against a server bound to an ephemeral loopback port.

use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use libria_core::protocol::{
    encode_message, payload_len_from_header, reject_reason, ChannelMessage, DisconnectReason,
    HelloAckMessage, HelloMessage, HEADER_SIZE, PROTOCOL_VERSION,
};
use libria_core::{decode_message, listener, InboundListeners, SurfaceId, UiSurface};
use libria_host::application::manage_surfaces::{SharedRegistry, SurfaceRegistry};
use libria_host::infrastructure::ipc::{IpcServer, IpcServerConfig, ServerHandle, SurfaceEvent};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

struct Host {
    server: ServerHandle,
    registry: SharedRegistry,
    inbound: InboundListeners,
    events: mpsc::Receiver<SurfaceEvent>,
}

async fn start_host() -> Host {
    start_host_with(WAIT).await
}

async fn start_host_with(hello_timeout: Duration) -> Host {
    let registry = SurfaceRegistry::shared();
    let inbound = InboundListeners::new();
    let config = IpcServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        hello_timeout,
        ping_interval: Duration::from_secs(60),
    };
    let (server, events) = IpcServer::bind(config, registry.clone(), inbound.clone())
        .await
        .unwrap();
    Host {
        server: server.spawn().unwrap(),
        registry,
        inbound,
        events,
    }
}

async fn send(stream: &mut TcpStream, msg: &ChannelMessage) {
    let bytes = encode_message(msg, 0, 0).unwrap();
    stream.write_all(&bytes).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> ChannelMessage {
    timeout(WAIT, async {
        let mut frame = vec![0u8; HEADER_SIZE];
        stream.read_exact(&mut frame).await.unwrap();
        let len = payload_len_from_header(&frame).unwrap();
        frame.resize(HEADER_SIZE + len, 0);
        stream.read_exact(&mut frame[HEADER_SIZE..]).await.unwrap();
        decode_message(&frame).unwrap().0
    })
    .await
    .expect("timed out waiting for a frame")
}

async fn hello(
    addr: SocketAddr,
    id: SurfaceId,
    label: &str,
    version: u8,
) -> (TcpStream, ChannelMessage) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(
        &mut stream,
        &ChannelMessage::Hello(HelloMessage {
            surface_id: id,
            protocol_version: version,
            label: label.to_string(),
        }),
    )
    .await;
    let ack = recv(&mut stream).await;
    (stream, ack)
}

/// Connects as an accepted `"main"` surface.
async fn connect_main(host: &mut Host) -> TcpStream {
    let addr = host.server.local_addr();
    let (stream, ack) = hello(addr, Uuid::new_v4(), "main", PROTOCOL_VERSION).await;
    assert_eq!(ack, accepted());
    next_event(&mut host.events).await;
    stream
}

fn accepted() -> ChannelMessage {
    ChannelMessage::HelloAck(HelloAckMessage {
        accepted: true,
        reject_reason: reject_reason::NONE,
    })
}

async fn next_event(events: &mut mpsc::Receiver<SurfaceEvent>) -> SurfaceEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a surface event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_hello_is_accepted_and_surface_registered() {
    // Arrange
    let mut host = start_host().await;
    let id = Uuid::new_v4();

    // Act
    let (_stream, ack) = hello(host.server.local_addr(), id, "main", PROTOCOL_VERSION).await;

    // Assert
    assert_eq!(ack, accepted());
    assert_eq!(
        next_event(&mut host.events).await,
        SurfaceEvent::Connected {
            id,
            label: "main".to_string()
        }
    );
    assert!(host.registry.read().unwrap().contains(id));
}

#[tokio::test]
async fn test_ui_event_reaches_host_inbound_listeners() {
    // Arrange
    let mut host = start_host().await;
    let (tx, rx) = std_mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    host.inbound.receive(
        "app:about",
        listener(move |p| {
            let _ = tx.lock().unwrap().send(p.clone());
        }),
    );
    let mut stream = connect_main(&mut host).await;

    // Act
    send(&mut stream, &ChannelMessage::event("app:about", json!(null))).await;

    // Assert
    let payload = tokio::task::spawn_blocking(move || rx.recv_timeout(WAIT))
        .await
        .unwrap()
        .expect("listener was not invoked");
    assert_eq!(payload, json!(null));
}

#[tokio::test]
async fn test_host_send_reaches_ui_in_order() {
    // Arrange
    let mut host = start_host().await;
    let mut stream = connect_main(&mut host).await;
    let surface = host.registry.read().unwrap().by_label("main").unwrap();

    // Act
    assert!(surface.send_to_surface("error:emit", &json!({"message": "one"})).is_queued());
    assert!(surface.send_to_surface("error:emit", &json!({"message": "two"})).is_queued());
    assert!(surface.open_devtools().is_queued());

    // Assert
    assert_eq!(
        recv(&mut stream).await,
        ChannelMessage::event("error:emit", json!({"message": "one"}))
    );
    assert_eq!(
        recv(&mut stream).await,
        ChannelMessage::event("error:emit", json!({"message": "two"}))
    );
    assert_eq!(recv(&mut stream).await, ChannelMessage::OpenDevtools);
}

#[tokio::test]
async fn test_duplicate_surface_id_is_rejected() {
    // Arrange
    let mut host = start_host().await;
    let id = Uuid::new_v4();
    let (_first, _) = hello(host.server.local_addr(), id, "main", PROTOCOL_VERSION).await;
    next_event(&mut host.events).await;

    // Act
    let (_second, ack) = hello(host.server.local_addr(), id, "main", PROTOCOL_VERSION).await;

    // Assert
    assert_eq!(
        ack,
        ChannelMessage::HelloAck(HelloAckMessage {
            accepted: false,
            reject_reason: reject_reason::DUPLICATE_SURFACE,
        })
    );
    assert!(matches!(
        next_event(&mut host.events).await,
        SurfaceEvent::Rejected { reason: reject_reason::DUPLICATE_SURFACE, .. }
    ));
    assert_eq!(host.registry.read().unwrap().len(), 1);
}

#[tokio::test]
async fn test_foreign_protocol_version_is_rejected() {
    let host = start_host().await;

    let addr = host.server.local_addr();
    let (_stream, ack) = hello(addr, Uuid::new_v4(), "main", PROTOCOL_VERSION + 1).await;

    assert_eq!(
        ack,
        ChannelMessage::HelloAck(HelloAckMessage {
            accepted: false,
            reject_reason: reject_reason::VERSION_MISMATCH,
        })
    );
    assert!(host.registry.read().unwrap().is_empty());
}

#[tokio::test]
async fn test_ping_is_answered_with_same_token() {
    let mut host = start_host().await;
    let mut stream = connect_main(&mut host).await;

    send(&mut stream, &ChannelMessage::Ping(77)).await;

    assert_eq!(recv(&mut stream).await, ChannelMessage::Pong(77));
}

#[tokio::test]
async fn test_ui_disconnect_removes_surface() {
    // Arrange
    let mut host = start_host().await;
    let id = Uuid::new_v4();
    let (mut stream, _) = hello(host.server.local_addr(), id, "torrent", PROTOCOL_VERSION).await;
    next_event(&mut host.events).await;
    let surface = host.registry.read().unwrap().get(id).unwrap();

    // Act
    send(
        &mut stream,
        &ChannelMessage::Disconnect {
            reason: DisconnectReason::SurfaceClosed,
        },
    )
    .await;

    // Assert
    assert_eq!(
        next_event(&mut host.events).await,
        SurfaceEvent::Disconnected {
            id,
            label: "torrent".to_string()
        }
    );
    assert!(!host.registry.read().unwrap().contains(id));
    assert!(!surface.send_to_surface("error:emit", &json!(null)).is_queued());
}

#[tokio::test]
async fn test_shutdown_notifies_connected_surfaces() {
    // Arrange
    let mut host = start_host().await;
    let mut stream = connect_main(&mut host).await;

    // Act
    host.server.shutdown().await;

    // Assert
    assert_eq!(
        recv(&mut stream).await,
        ChannelMessage::Disconnect {
            reason: DisconnectReason::HostShutdown
        }
    );
}

#[tokio::test]
async fn test_garbage_header_closes_connection_with_protocol_error() {
    // Arrange
    let mut host = start_host().await;
    let mut stream = connect_main(&mut host).await;

    // Act: a header with an unknown protocol version
    let mut bogus = encode_message(&ChannelMessage::Ping(1), 0, 0).unwrap();
    bogus[0] = 0xEE;
    stream.write_all(&bogus).await.unwrap();

    // Assert
    assert_eq!(
        recv(&mut stream).await,
        ChannelMessage::Disconnect {
            reason: DisconnectReason::ProtocolError
        }
    );
    assert!(matches!(
        next_event(&mut host.events).await,
        SurfaceEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn test_ui_events_reach_host_in_send_order() {
    // Arrange
    let mut host = start_host().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    host.inbound.receive(
        "torrent:progress",
        listener(move |p| sink.lock().unwrap().push(p.clone())),
    );
    let mut stream = connect_main(&mut host).await;

    // Act: the ping is answered only after every earlier frame was delivered
    for n in 0..5 {
        send(&mut stream, &ChannelMessage::event("torrent:progress", json!(n))).await;
    }
    send(&mut stream, &ChannelMessage::Ping(9)).await;
    assert_eq!(recv(&mut stream).await, ChannelMessage::Pong(9));

    // Assert
    assert_eq!(
        *seen.lock().unwrap(),
        [json!(0), json!(1), json!(2), json!(3), json!(4)]
    );
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_silent_connection() {
    // Arrange: a peer that connects and never says Hello
    let host = start_host_with(Duration::from_secs(30)).await;
    let _silent = TcpStream::connect(host.server.local_addr()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Act
    let started = Instant::now();
    timeout(WAIT, host.server.shutdown())
        .await
        .expect("shutdown waited for the handshake");

    // Assert
    assert!(started.elapsed() < WAIT);
}
