//! Scripted WebSocket client for smoke-testing a running server.
//!
//! Identifies, asks for a match and plays the given moves whenever it holds
//! the turn. Run two instances with different users to watch a full game.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{Frame, Packet, SeatColor, WireFormat};
use std::collections::VecDeque;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted session server client", long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// User identity to announce
    #[arg(short = 'u', long, default_value = "test-client")]
    user: String,

    /// Comma separated UCI moves to play, e.g. e2e4,g1f3
    #[arg(short = 'm', long, value_delimiter = ',')]
    moves: Vec<String>,

    /// Talk bincode over binary frames instead of JSON
    #[arg(short = 'b', long)]
    binary: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let format = if args.binary {
        WireFormat::Bincode
    } else {
        WireFormat::Json
    };

    println!("Connecting to {}", args.server);
    let (ws_stream, _) = connect_async(args.server.as_str()).await?;
    let (mut sender, mut receiver) = ws_stream.split();

    for packet in [
        Packet::Identify {
            user_id: args.user.clone(),
        },
        Packet::FindMatch {},
    ] {
        println!("Sending {:?}", packet);
        sender.send(to_message(&packet, format)?).await?;
    }

    let mut moves: VecDeque<String> = args.moves.into_iter().collect();
    let mut seat = None;

    while let Some(message) = receiver.next().await {
        let packet = match message? {
            Message::Text(text) => Packet::from_json(&text)?,
            Message::Binary(bytes) => Packet::from_bytes(&bytes)?,
            Message::Close(_) => break,
            _ => continue,
        };
        println!("Received {:?}", packet);

        let (session_id, ply) = match &packet {
            Packet::SessionStarted {
                session_id,
                seat_color,
                ply,
                ..
            } => {
                seat = Some(*seat_color);
                (session_id.clone(), *ply)
            }
            Packet::StateUpdated {
                session_id,
                is_terminal: false,
                ply,
                ..
            } => (session_id.clone(), *ply),
            Packet::GameOver { result, .. } => {
                println!("Game over: {}", result);
                break;
            }
            _ => continue,
        };

        let our_turn = match seat {
            Some(SeatColor::FirstMover) => ply % 2 == 0,
            Some(SeatColor::SecondMover) => ply % 2 == 1,
            None => false,
        };
        if !our_turn {
            continue;
        }

        let Some(mv) = moves.pop_front() else {
            println!("Out of moves, leaving");
            break;
        };
        let submit = Packet::SubmitMove { session_id, mv };
        println!("Sending {:?}", submit);
        sender.send(to_message(&submit, format)?).await?;
    }

    sender.close().await?;
    println!("Test client finished");
    Ok(())
}

fn to_message(packet: &Packet, format: WireFormat) -> Result<Message, shared::WireError> {
    Ok(match packet.encode(format)? {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
    })
}
