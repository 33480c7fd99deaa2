//! Connection registry for the session server
//!
//! This module tracks every live network connection, including:
//! - Connection lifecycle (register, identify, unbind)
//! - The user identity a connection speaks for
//! - The single session a connection is currently a member of
//! - Capacity management
//!
//! User identities outlive connections. A player who reconnects gets a new
//! connection id but resolves to the same user, which is what lets the
//! session manager hand their seat back and refuse self-joins.

use crate::session::{ConnectionId, SessionId, UserId};
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;

/// A live connection and what it is bound to
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Identity the connection acts for
    pub user_id: UserId,
    /// Session this connection currently plays in
    pub session: Option<SessionId>,
}

impl Connection {
    /// Creates a connection bound to a provisional guest identity
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            user_id: guest_identity(id),
            session: None,
        }
    }
}

/// Identity used before a client identifies itself
pub fn guest_identity(id: ConnectionId) -> UserId {
    format!("guest-{id}")
}

/// Maps connection ids to identities and session memberships
///
/// The registry is the only place that knows which session a connection
/// belongs to. Membership changes go through [`claim`](Self::claim),
/// [`release`](Self::release) and [`migrate`](Self::migrate), each of which
/// is a compare-and-set on the current membership so concurrent pairings
/// cannot give one connection two sessions.
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry. Connection ids start from 1.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a new connection
    ///
    /// Returns `None` when the server is at capacity.
    pub fn register(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let id = self.next_connection_id;
        self.next_connection_id = self.next_connection_id.wrapping_add(1).max(1);

        info!("Connection {} opened from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr));
        Some(id)
    }

    /// Associates a connection with a user identity
    ///
    /// Re-binding overwrites the previous identity. Returns false if the
    /// connection is unknown.
    pub fn bind(&mut self, id: ConnectionId, user_id: UserId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                info!("Connection {} identified as {}", id, user_id);
                connection.user_id = user_id;
                true
            }
            None => false,
        }
    }

    /// Resolves the identity behind a connection
    pub fn resolve(&self, id: ConnectionId) -> Option<UserId> {
        self.connections
            .get(&id)
            .map(|connection| connection.user_id.clone())
    }

    /// Forgets a connection, returning its final state
    pub fn unbind(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        info!(
            "Connection {} ({} from {}) closed",
            id, connection.user_id, connection.addr
        );
        Some(connection)
    }

    /// Session the connection currently belongs to
    pub fn membership(&self, id: ConnectionId) -> Option<SessionId> {
        self.connections
            .get(&id)
            .and_then(|connection| connection.session.clone())
    }

    /// Makes `session` the connection's membership if it has none
    ///
    /// Claiming the session it already belongs to succeeds. Returns false for
    /// unknown connections and connections that belong to another session.
    pub fn claim(&mut self, id: ConnectionId, session: &SessionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => match &connection.session {
                None => {
                    connection.session = Some(session.clone());
                    true
                }
                Some(current) => current == session,
            },
            None => false,
        }
    }

    /// Clears the membership if it is still `session`
    pub fn release(&mut self, id: ConnectionId, session: &SessionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) if connection.session.as_ref() == Some(session) => {
                connection.session = None;
                true
            }
            _ => false,
        }
    }

    /// Moves the membership from `from` to `to`, used when a rematch
    /// supersedes a session
    pub fn migrate(&mut self, id: ConnectionId, from: &SessionId, to: &SessionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) if connection.session.as_ref() == Some(from) => {
                connection.session = Some(to.clone());
                true
            }
            _ => false,
        }
    }

    /// Returns the number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are live
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
