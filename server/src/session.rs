//! Session data model
//!
//! A session is one game between two seats. It owns the serialized position
//! handed out by the position authority, the move history and the seat
//! bindings. Only the session manager mutates sessions, always while holding
//! the session's lock in the store.

use crate::authority::AppliedMove;
use crate::error::JoinError;
use rand::Rng;
use shared::{GameResult, Packet, SeatColor};
use std::fmt;
use std::time::{Duration, Instant, SystemTime};
use uuid::Uuid;

/// Identifier of one live network connection
pub type ConnectionId = u32;

/// Stable user identity supplied by the identity system
pub type UserId = String;

const SHORT_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const SHORT_CODE_LEN: usize = 6;

/// Opaque, globally unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Random six character code that is easy to read out to a friend.
    pub fn short_code() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..SHORT_CODE_LEN)
            .map(|_| SHORT_CODE_ALPHABET[rng.gen_range(0..SHORT_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn uuid() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    AwaitingOpponent,
    Active,
    Completed,
}

/// A taken seat. The user stays attached after their connection drops so
/// they can come back; `connection` is `None` while they are away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub user_id: UserId,
    pub connection: Option<ConnectionId>,
    pub disconnected_at: Option<Instant>,
}

impl Seat {
    pub fn new(user_id: UserId, connection: ConnectionId) -> Self {
        Self {
            user_id,
            connection: Some(connection),
            disconnected_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub position: String,
    pub history: Vec<String>,
    /// Half-moves applied so far; strictly increases with every broadcast state
    pub ply: u32,
    pub result: Option<GameResult>,
    pub created_at: SystemTime,
    seats: [Option<Seat>; 2],
    retired: bool,
}

impl Session {
    /// Session waiting for a second player
    pub fn new(id: SessionId, position: String, creator: Seat) -> Self {
        Self {
            id,
            status: SessionStatus::AwaitingOpponent,
            position,
            history: Vec::new(),
            ply: 0,
            result: None,
            created_at: SystemTime::now(),
            seats: [Some(creator), None],
            retired: false,
        }
    }

    /// Session that starts immediately with both seats taken
    pub fn with_players(id: SessionId, position: String, first: Seat, second: Seat) -> Self {
        let mut session = Self::new(id, position, first);
        session.seats[SeatColor::SecondMover.index()] = Some(second);
        session.status = SessionStatus::Active;
        session
    }

    pub fn seat(&self, color: SeatColor) -> Option<&Seat> {
        self.seats[color.index()].as_ref()
    }

    /// User ids per seat, first mover first
    pub fn seat_user_ids(&self) -> Vec<UserId> {
        self.seats
            .iter()
            .flatten()
            .map(|seat| seat.user_id.clone())
            .collect()
    }

    pub fn seat_of_connection(&self, connection: ConnectionId) -> Option<SeatColor> {
        [SeatColor::FirstMover, SeatColor::SecondMover]
            .into_iter()
            .find(|color| {
                self.seat(*color)
                    .is_some_and(|seat| seat.connection == Some(connection))
            })
    }

    pub fn seat_of_user(&self, user_id: &str) -> Option<SeatColor> {
        [SeatColor::FirstMover, SeatColor::SecondMover]
            .into_iter()
            .find(|color| self.seat(*color).is_some_and(|seat| seat.user_id == user_id))
    }

    /// Seated, currently connected connections
    pub fn connections(&self) -> Vec<(SeatColor, ConnectionId)> {
        [SeatColor::FirstMover, SeatColor::SecondMover]
            .into_iter()
            .filter_map(|color| {
                self.seat(color)
                    .and_then(|seat| seat.connection)
                    .map(|connection| (color, connection))
            })
            .collect()
    }

    /// Seats the joiner as second mover. Self-join is judged by user
    /// identity so a reconnected creator is still refused.
    pub fn seat_opponent(&mut self, joiner: Seat) -> Result<(), JoinError> {
        if self.retired {
            return Err(JoinError::NotFound);
        }
        if self.seats[SeatColor::SecondMover.index()].is_some()
            || self.status != SessionStatus::AwaitingOpponent
        {
            return Err(JoinError::AlreadyFull);
        }
        if self
            .seat(SeatColor::FirstMover)
            .is_some_and(|creator| creator.user_id == joiner.user_id)
        {
            return Err(JoinError::SelfJoin);
        }

        self.seats[SeatColor::SecondMover.index()] = Some(joiner);
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// Binds a seat to a (new) connection
    pub fn rebind(&mut self, color: SeatColor, connection: ConnectionId) -> bool {
        match self.seats[color.index()].as_mut() {
            Some(seat) => {
                seat.connection = Some(connection);
                seat.disconnected_at = None;
                true
            }
            None => false,
        }
    }

    /// Keeps the seat reserved but forgets the dead connection
    pub fn mark_disconnected(&mut self, connection: ConnectionId) -> Option<SeatColor> {
        let color = self.seat_of_connection(connection)?;
        if let Some(seat) = self.seats[color.index()].as_mut() {
            seat.connection = None;
            seat.disconnected_at = Some(Instant::now());
        }
        Some(color)
    }

    pub fn record_move(&mut self, applied: AppliedMove) {
        self.position = applied.position;
        self.history.push(applied.notation);
        self.ply += 1;
    }

    pub fn complete(&mut self, result: GameResult) {
        self.status = SessionStatus::Completed;
        self.result = Some(result);
    }

    pub fn is_terminal(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Marks the session as superseded; it accepts no further mutation
    pub fn retire(&mut self) {
        self.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Seats for a rematch: colours swapped, same users and connections.
    /// A seat whose player is away stays away in the new session.
    pub fn swapped_seats(&self) -> Option<(Seat, Seat)> {
        let first = self.seat(SeatColor::SecondMover)?.clone();
        let second = self.seat(SeatColor::FirstMover)?.clone();
        Some((first, second))
    }

    /// True when no seat has had a connection for longer than `timeout`
    pub fn is_abandoned(&self, timeout: Duration) -> bool {
        let mut taken = self.seats.iter().flatten().peekable();
        if taken.peek().is_none() {
            return true;
        }
        taken.all(|seat| {
            seat.connection.is_none()
                && seat
                    .disconnected_at
                    .is_some_and(|at| at.elapsed() >= timeout)
        })
    }

    /// Private start/resync message for one seat
    pub fn started_packet(&self, color: SeatColor) -> Packet {
        Packet::SessionStarted {
            session_id: self.id.to_string(),
            seat_color: color,
            position_state: self.position.clone(),
            move_history: self.history.clone(),
            is_terminal: self.is_terminal(),
            ply: self.ply,
        }
    }

    /// State broadcast after an accepted move
    pub fn state_packet(&self) -> Packet {
        Packet::StateUpdated {
            session_id: self.id.to_string(),
            position_state: self.position.clone(),
            move_history: self.history.clone(),
            is_terminal: self.is_terminal(),
            ply: self.ply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_session() -> Session {
        Session::new(
            SessionId::from("ABC234"),
            "start".to_string(),
            Seat::new("alice".to_string(), 1),
        )
    }

    #[test]
    fn test_short_code_shape() {
        let id = SessionId::short_code();
        assert_eq!(id.as_str().len(), SHORT_CODE_LEN);
        assert!(id
            .as_str()
            .bytes()
            .all(|b| SHORT_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        assert_ne!(SessionId::uuid(), SessionId::uuid());
    }

    #[test]
    fn test_new_session_awaits_opponent() {
        let session = waiting_session();
        assert_eq!(session.status, SessionStatus::AwaitingOpponent);
        assert_eq!(session.seat_of_connection(1), Some(SeatColor::FirstMover));
        assert!(session.seat(SeatColor::SecondMover).is_none());
        assert_eq!(session.seat_user_ids(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_seat_opponent_activates() {
        let mut session = waiting_session();
        session
            .seat_opponent(Seat::new("bob".to_string(), 2))
            .unwrap();

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.seat_of_user("bob"), Some(SeatColor::SecondMover));
        assert_eq!(
            session.connections(),
            vec![(SeatColor::FirstMover, 1), (SeatColor::SecondMover, 2)]
        );
    }

    #[test]
    fn test_seat_opponent_full() {
        let mut session = waiting_session();
        session
            .seat_opponent(Seat::new("bob".to_string(), 2))
            .unwrap();

        let err = session
            .seat_opponent(Seat::new("carol".to_string(), 3))
            .unwrap_err();
        assert_eq!(err, JoinError::AlreadyFull);
    }

    #[test]
    fn test_self_join_uses_identity() {
        let mut session = waiting_session();
        // Same user, different connection
        let err = session
            .seat_opponent(Seat::new("alice".to_string(), 99))
            .unwrap_err();
        assert_eq!(err, JoinError::SelfJoin);
        assert_eq!(session.status, SessionStatus::AwaitingOpponent);
    }

    #[test]
    fn test_disconnect_keeps_seat() {
        let mut session = waiting_session();
        session
            .seat_opponent(Seat::new("bob".to_string(), 2))
            .unwrap();

        assert_eq!(session.mark_disconnected(2), Some(SeatColor::SecondMover));
        assert_eq!(session.seat_of_user("bob"), Some(SeatColor::SecondMover));
        assert_eq!(session.connections(), vec![(SeatColor::FirstMover, 1)]);

        assert!(session.rebind(SeatColor::SecondMover, 7));
        assert_eq!(session.seat_of_connection(7), Some(SeatColor::SecondMover));
    }

    #[test]
    fn test_record_move_advances_ply() {
        let mut session = waiting_session();
        session.record_move(AppliedMove {
            position: "next".to_string(),
            notation: "e4".to_string(),
        });

        assert_eq!(session.ply, 1);
        assert_eq!(session.position, "next");
        assert_eq!(session.history, vec!["e4".to_string()]);
    }

    #[test]
    fn test_swapped_seats() {
        let mut session = waiting_session();
        assert!(session.swapped_seats().is_none());

        session
            .seat_opponent(Seat::new("bob".to_string(), 2))
            .unwrap();
        let (first, second) = session.swapped_seats().unwrap();
        assert_eq!(first.user_id, "bob");
        assert_eq!(first.connection, Some(2));
        assert_eq!(second.user_id, "alice");
    }

    #[test]
    fn test_abandonment() {
        let mut session = waiting_session();
        assert!(!session.is_abandoned(Duration::ZERO));

        session.mark_disconnected(1);
        assert!(session.is_abandoned(Duration::ZERO));
        assert!(!session.is_abandoned(Duration::from_secs(3600)));
    }

    #[test]
    fn test_retired_session_refuses_join() {
        let mut session = waiting_session();
        session.retire();
        assert_eq!(
            session.seat_opponent(Seat::new("bob".to_string(), 2)),
            Err(JoinError::NotFound)
        );
    }
}
