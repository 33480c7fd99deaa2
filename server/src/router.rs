//! Broadcast and routing layer
//!
//! Delivery is scoped by a routing table `session id -> connection ids`
//! that knows nothing about the transport. Each connection has a bounded
//! outbox drained by its writer task. Sends never wait: a full or closed
//! outbox drops the message, and the reconnect path is responsible for
//! catching the connection up again.

use crate::session::{ConnectionId, SessionId};
use log::{debug, warn};
use shared::Packet;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound queue of one connection
pub type Outbox = mpsc::Sender<Packet>;

#[derive(Default)]
pub struct Router {
    outboxes: HashMap<ConnectionId, Outbox>,
    rooms: HashMap<SessionId, HashSet<ConnectionId>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&mut self, connection: ConnectionId, outbox: Outbox) {
        self.outboxes.insert(connection, outbox);
    }

    /// Drops the connection's outbox and removes it from every room.
    /// Dropping the outbox lets the writer task finish.
    pub fn remove_connection(&mut self, connection: ConnectionId) {
        self.outboxes.remove(&connection);
        self.rooms.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    pub fn join_room(&mut self, session: &SessionId, connection: ConnectionId) {
        self.rooms
            .entry(session.clone())
            .or_default()
            .insert(connection);
    }

    pub fn leave_room(&mut self, session: &SessionId, connection: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(session) {
            members.remove(&connection);
            if members.is_empty() {
                self.rooms.remove(session);
            }
        }
    }

    /// Moves one connection's room membership from `from` to `to`
    pub fn migrate(&mut self, connection: ConnectionId, from: &SessionId, to: &SessionId) {
        self.leave_room(from, connection);
        self.join_room(to, connection);
    }

    pub fn close_room(&mut self, session: &SessionId) {
        self.rooms.remove(session);
    }

    /// Delivers to exactly one connection. Returns whether it was queued.
    pub fn send_to_connection(&self, connection: ConnectionId, packet: Packet) -> bool {
        let Some(outbox) = self.outboxes.get(&connection) else {
            debug!("Dropping message for closed connection {}", connection);
            return false;
        };

        match outbox.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbox of connection {} is full, dropping message", connection);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Dropping message for closed connection {}", connection);
                false
            }
        }
    }

    /// Delivers to every member of the session's room. Returns how many
    /// connections the message was queued for.
    pub fn send_to_session(&self, session: &SessionId, packet: &Packet) -> usize {
        let Some(members) = self.rooms.get(session) else {
            return 0;
        };

        members
            .iter()
            .filter(|connection| self.send_to_connection(**connection, packet.clone()))
            .count()
    }
}
