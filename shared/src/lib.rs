use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Seat (colour) within a two-player session. `FirstMover` moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeatColor {
    FirstMover,
    SecondMover,
}

impl SeatColor {
    pub fn index(self) -> usize {
        match self {
            SeatColor::FirstMover => 0,
            SeatColor::SecondMover => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeatColor::FirstMover => "first-mover",
            SeatColor::SecondMover => "second-mover",
        }
    }
}

impl fmt::Display for SeatColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameResult {
    FirstMoverWins,
    SecondMoverWins,
    Draw,
}

impl GameResult {
    pub fn win_for(seat: SeatColor) -> Self {
        match seat {
            SeatColor::FirstMover => GameResult::FirstMoverWins,
            SeatColor::SecondMover => GameResult::SecondMoverWins,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::FirstMoverWins => f.write_str("first-mover-wins"),
            GameResult::SecondMoverWins => f.write_str("second-mover-wins"),
            GameResult::Draw => f.write_str("draw"),
        }
    }
}

/// Why a join-style request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NotFound,
    AlreadyFull,
    SelfJoin,
    AlreadyInSession,
}

/// Every message exchanged between clients and the session server.
///
/// Client-to-server messages come first, server-to-client replies after.
/// Variants are externally tagged with kebab-case names so the same enum
/// works for JSON text frames and bincode binary frames:
/// `{"join-session":{"sessionId":"K3F9QX"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Packet {
    Identify {
        user_id: String,
    },
    CreateSession {},
    JoinSession {
        session_id: String,
    },
    FindMatch {},
    LeaveQueue {},
    SubmitMove {
        session_id: String,
        #[serde(rename = "move")]
        mv: String,
    },
    Rematch {
        session_id: String,
    },
    ResumeSession {
        session_id: String,
    },

    Identified {
        user_id: String,
    },
    SessionCreated {
        session_id: String,
        seat_color: SeatColor,
    },
    SessionStarted {
        session_id: String,
        seat_color: SeatColor,
        position_state: String,
        move_history: Vec<String>,
        is_terminal: bool,
        ply: u32,
    },
    Queued {
        position: u32,
    },
    StateUpdated {
        session_id: String,
        position_state: String,
        move_history: Vec<String>,
        is_terminal: bool,
        ply: u32,
    },
    GameOver {
        session_id: String,
        result: GameResult,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl Packet {
    /// True for messages a client is allowed to send.
    pub fn is_client_message(&self) -> bool {
        matches!(
            self,
            Packet::Identify { .. }
                | Packet::CreateSession {}
                | Packet::JoinSession { .. }
                | Packet::FindMatch {}
                | Packet::LeaveQueue {}
                | Packet::SubmitMove { .. }
                | Packet::Rematch { .. }
                | Packet::ResumeSession { .. }
        )
    }

    pub fn encode(&self, format: WireFormat) -> Result<Frame, WireError> {
        match format {
            WireFormat::Json => Ok(Frame::Text(serde_json::to_string(self)?)),
            WireFormat::Bincode => Ok(Frame::Binary(bincode::serialize(self)?)),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Encoding used on a connection. Text frames are JSON, binary frames bincode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    Bincode,
}

/// Transport-neutral encoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid json packet: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid binary packet: {0}")]
    Bincode(#[from] bincode::Error),
}
