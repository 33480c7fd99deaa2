//! Position authority boundary
//!
//! The session layer never interprets positions itself. It stores the
//! serialized position a [`PositionAuthority`] hands back and asks the
//! authority whose turn it is, whether a move is legal and whether the game
//! has ended.
//!
//! [`ChessAuthority`] adapts the `shakmaty` rules engine to this boundary.
//! Positions are FEN strings and moves are UCI strings (`e2e4`, `e7e8q`);
//! accepted moves are reported back in SAN for the move history.
//!
//! Draws are stalemate, insufficient material and the fifty-move rule.
//! Threefold repetition needs the position history and is not detected.

use shakmaty::{fen::Fen, san::San, uci::UciMove, CastlingMode, Chess, Color, Position};
use shared::SeatColor;
use thiserror::Error;

/// Half-moves without a capture or pawn move that end the game
const FIFTY_MOVE_HALFMOVES: u32 = 100;

/// Terminal condition reported by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Checkmate,
    Draw,
}

/// Result of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// Serialized position after the move
    pub position: String,
    /// Human readable notation recorded in the move history
    pub notation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveRejected {
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("invalid move notation: {0}")]
    InvalidNotation(String),
    #[error("illegal move: {0}")]
    Illegal(String),
}

/// External rules engine consulted for every move.
///
/// Calls are synchronous and must be cheap; the session layer invokes them
/// while holding the session's lock.
pub trait PositionAuthority: Send + Sync {
    /// Position a fresh session starts from
    fn initial_position(&self) -> String;

    /// Validates `mv` against `position` and returns the successor position
    fn apply_move(&self, position: &str, mv: &str) -> Result<AppliedMove, MoveRejected>;

    /// Seat that must make the next move, `None` if the position is unreadable
    fn turn_owner(&self, position: &str) -> Option<SeatColor>;

    /// `Some` once the position ends the game
    fn terminal_status(&self, position: &str) -> Option<TerminalStatus>;
}

/// Chess rules via `shakmaty`. White is the first mover.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChessAuthority;

impl ChessAuthority {
    pub fn new() -> Self {
        Self
    }

    fn parse(position: &str) -> Result<Chess, MoveRejected> {
        let fen: Fen = position
            .parse()
            .map_err(|e| MoveRejected::InvalidPosition(format!("{e}")))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| MoveRejected::InvalidPosition(format!("{e}")))
    }

    fn to_fen(position: &Chess) -> String {
        Fen::from_position(position.clone(), shakmaty::EnPassantMode::Legal).to_string()
    }
}

impl PositionAuthority for ChessAuthority {
    fn initial_position(&self) -> String {
        Self::to_fen(&Chess::default())
    }

    fn apply_move(&self, position: &str, mv: &str) -> Result<AppliedMove, MoveRejected> {
        let current = Self::parse(position)?;

        let uci: UciMove = mv
            .parse()
            .map_err(|_| MoveRejected::InvalidNotation(mv.to_string()))?;
        let m = uci
            .to_move(&current)
            .map_err(|_| MoveRejected::Illegal(mv.to_string()))?;

        // SAN depends on the position before the move
        let san = San::from_move(&current, &m);

        let next = current
            .play(&m)
            .map_err(|_| MoveRejected::Illegal(mv.to_string()))?;

        Ok(AppliedMove {
            position: Self::to_fen(&next),
            notation: san.to_string(),
        })
    }

    fn turn_owner(&self, position: &str) -> Option<SeatColor> {
        let current = Self::parse(position).ok()?;
        Some(match current.turn() {
            Color::White => SeatColor::FirstMover,
            Color::Black => SeatColor::SecondMover,
        })
    }

    fn terminal_status(&self, position: &str) -> Option<TerminalStatus> {
        let current = Self::parse(position).ok()?;
        if current.is_checkmate() {
            Some(TerminalStatus::Checkmate)
        } else if current.is_stalemate()
            || current.is_insufficient_material()
            || current.halfmoves() >= FIFTY_MOVE_HALFMOVES
        {
            Some(TerminalStatus::Draw)
        } else {
            None
        }
    }
}
