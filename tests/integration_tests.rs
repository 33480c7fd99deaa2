//! Integration tests for the session server
//!
//! These tests validate the wire protocol and real WebSocket behaviour
//! against a server bound to an ephemeral port.

use futures_util::{SinkExt, StreamExt};
use server::config::ServerConfig;
use server::network::Server;
use shared::{Frame, Packet, RejectReason, SeatColor, WireFormat};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Outbound messages use kebab-case tags and camelCase fields
    #[test]
    fn session_started_json_shape() {
        let packet = Packet::SessionStarted {
            session_id: "K3F9QX".to_string(),
            seat_color: SeatColor::SecondMover,
            position_state: "start".to_string(),
            move_history: vec![],
            is_terminal: false,
            ply: 0,
        };

        let Frame::Text(text) = assert_ok!(packet.encode(WireFormat::Json)) else {
            panic!("json encoding must produce a text frame");
        };
        let value: serde_json::Value = assert_ok!(serde_json::from_str(&text));
        let body = &value["session-started"];

        assert_eq!(body["sessionId"], "K3F9QX");
        assert_eq!(body["seatColor"], "second-mover");
        assert_eq!(body["isTerminal"], false);
        assert!(body["moveHistory"].as_array().unwrap().is_empty());
    }

    #[test]
    fn rejected_reason_names() {
        let packet = Packet::Rejected {
            reason: RejectReason::SelfJoin,
        };
        let Frame::Text(text) = assert_ok!(packet.encode(WireFormat::Json)) else {
            panic!("json encoding must produce a text frame");
        };
        assert_eq!(text, r#"{"rejected":{"reason":"SelfJoin"}}"#);
    }

    /// Tests malformed frames are refused without panicking
    #[test]
    fn malformed_packet_handling() {
        assert_err!(Packet::from_json("not json"));
        assert_err!(Packet::from_json(r#"{"no-such-message":{}}"#));
        assert_err!(Packet::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0x01]));
        assert_err!(Packet::from_bytes(&[]));
    }

    #[test]
    fn bincode_frames_decode_to_same_message() {
        let packet = Packet::SubmitMove {
            session_id: "S".to_string(),
            mv: "e2e4".to_string(),
        };
        let Frame::Binary(bytes) = assert_ok!(packet.encode(WireFormat::Bincode)) else {
            panic!("bincode encoding must produce a binary frame");
        };
        assert_eq!(assert_ok!(Packet::from_bytes(&bytes)), packet);
    }
}

/// REAL WEBSOCKET TESTS
mod websocket_tests {
    use super::*;

    async fn start_server() -> (SocketAddr, oneshot::Sender<()>) {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        };
        let server = Server::bind(config).await.expect("Failed to bind server");
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = server
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        (addr, shutdown_tx)
    }

    async fn open(addr: SocketAddr) -> Socket {
        let (socket, _) = connect_async(format!("ws://{}", addr))
            .await
            .expect("Failed to connect");
        socket
    }

    async fn send(socket: &mut Socket, packet: Packet, format: WireFormat) {
        let message = match packet.encode(format).unwrap() {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };
        socket.send(message).await.unwrap();
    }

    /// Next packet and whether it arrived as a binary frame
    async fn recv(socket: &mut Socket) -> (Packet, bool) {
        loop {
            let message = timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("Timed out waiting for a message")
                .expect("Connection closed")
                .unwrap();

            match message {
                Message::Text(text) => return (Packet::from_json(&text).unwrap(), false),
                Message::Binary(bytes) => return (Packet::from_bytes(&bytes).unwrap(), true),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn create_join_and_move_round_trip() {
        let (addr, shutdown) = start_server().await;
        let mut alice = open(addr).await;
        let mut bob = open(addr).await;

        send(
            &mut alice,
            Packet::Identify {
                user_id: "alice".to_string(),
            },
            WireFormat::Json,
        )
        .await;
        assert!(matches!(recv(&mut alice).await.0, Packet::Identified { .. }));

        // Bob talks bincode and must be answered in bincode
        send(
            &mut bob,
            Packet::Identify {
                user_id: "bob".to_string(),
            },
            WireFormat::Bincode,
        )
        .await;
        let (identified, binary) = recv(&mut bob).await;
        assert_eq!(
            identified,
            Packet::Identified {
                user_id: "bob".to_string()
            }
        );
        assert!(binary);

        send(&mut alice, Packet::CreateSession {}, WireFormat::Json).await;
        let session_id = match recv(&mut alice).await.0 {
            Packet::SessionCreated {
                session_id,
                seat_color,
            } => {
                assert_eq!(seat_color, SeatColor::FirstMover);
                session_id
            }
            other => panic!("expected session-created, got {:?}", other),
        };

        send(
            &mut bob,
            Packet::JoinSession {
                session_id: session_id.clone(),
            },
            WireFormat::Bincode,
        )
        .await;

        for (socket, expected) in [
            (&mut alice, SeatColor::FirstMover),
            (&mut bob, SeatColor::SecondMover),
        ] {
            match recv(socket).await.0 {
                Packet::SessionStarted {
                    seat_color, ply, ..
                } => {
                    assert_eq!(seat_color, expected);
                    assert_eq!(ply, 0);
                }
                other => panic!("expected session-started, got {:?}", other),
            }
        }

        send(
            &mut alice,
            Packet::SubmitMove {
                session_id: session_id.clone(),
                mv: "e2e4".to_string(),
            },
            WireFormat::Json,
        )
        .await;

        for socket in [&mut alice, &mut bob] {
            match recv(socket).await.0 {
                Packet::StateUpdated {
                    move_history,
                    ply,
                    is_terminal,
                    ..
                } => {
                    assert_eq!(move_history, vec!["e4".to_string()]);
                    assert_eq!(ply, 1);
                    assert!(!is_terminal);
                }
                other => panic!("expected state-updated, got {:?}", other),
            }
        }

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn join_unknown_session_is_rejected() {
        let (addr, shutdown) = start_server().await;
        let mut client = open(addr).await;

        send(
            &mut client,
            Packet::JoinSession {
                session_id: "NOPE42".to_string(),
            },
            WireFormat::Json,
        )
        .await;

        assert_eq!(
            recv(&mut client).await.0,
            Packet::Rejected {
                reason: RejectReason::NotFound
            }
        );

        let _ = shutdown.send(());
    }

    /// Undecodable frames are dropped and the connection stays usable
    #[tokio::test]
    async fn garbage_frame_keeps_connection_open() {
        let (addr, shutdown) = start_server().await;
        let mut client = open(addr).await;

        client
            .send(Message::Text("{definitely not a packet".to_string()))
            .await
            .unwrap();
        send(&mut client, Packet::FindMatch {}, WireFormat::Json).await;

        assert_eq!(recv(&mut client).await.0, Packet::Queued { position: 1 });

        let _ = shutdown.send(());
    }
}
