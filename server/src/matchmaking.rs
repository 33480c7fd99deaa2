//! FIFO matchmaking queue
//!
//! Tickets are paired strictly in arrival order. Enqueueing and the pairing
//! check happen under one lock, so two near-simultaneous `enqueue` calls can
//! neither both miss the pairing threshold nor both consume the same ticket.

use crate::session::{ConnectionId, UserId};
use log::{debug, info};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// A participant waiting for an opponent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub connection: ConnectionId,
    pub user_id: UserId,
}

impl Ticket {
    pub fn new(connection: ConnectionId, user_id: impl Into<UserId>) -> Self {
        Self {
            connection,
            user_id: user_id.into(),
        }
    }
}

/// Outcome of an enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Waiting at this 1-based position
    Waiting(u32),
    /// Connection was already queued; nothing changed
    AlreadyQueued(u32),
    /// The two oldest compatible tickets, earlier-queued first
    Paired(Ticket, Ticket),
}

#[derive(Default)]
pub struct MatchmakingQueue {
    tickets: Mutex<VecDeque<Ticket>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a ticket and pairs the two oldest tickets once there are
    /// enough. Idempotent per connection.
    pub async fn enqueue(&self, ticket: Ticket) -> Enqueued {
        let mut tickets = self.tickets.lock().await;

        if let Some(index) = position_of(&tickets, ticket.connection) {
            return Enqueued::AlreadyQueued(index as u32 + 1);
        }

        debug!(
            "Connection {} ({}) queued for a match",
            ticket.connection, ticket.user_id
        );
        tickets.push_back(ticket);

        match take_pair(&mut tickets) {
            Some((first, second)) => {
                info!(
                    "Paired connection {} with connection {}",
                    first.connection, second.connection
                );
                Enqueued::Paired(first, second)
            }
            None => {
                let position = tickets.len() as u32;
                Enqueued::Waiting(position)
            }
        }
    }

    /// Removes the connection's ticket. No-op if it isn't queued.
    pub async fn dequeue(&self, connection: ConnectionId) -> bool {
        let mut tickets = self.tickets.lock().await;
        match position_of(&tickets, connection) {
            Some(index) => {
                tickets.remove(index);
                debug!("Connection {} left the matchmaking queue", connection);
                true
            }
            None => false,
        }
    }

    /// Puts a ticket back at the head of the queue, ahead of later arrivals,
    /// and pairs again if a partner is already waiting
    pub async fn requeue_front(&self, ticket: Ticket) -> Option<(Ticket, Ticket)> {
        let mut tickets = self.tickets.lock().await;
        if position_of(&tickets, ticket.connection).is_none() {
            tickets.push_front(ticket);
        }
        take_pair(&mut tickets)
    }

    pub async fn position(&self, connection: ConnectionId) -> Option<u32> {
        let tickets = self.tickets.lock().await;
        position_of(&tickets, connection).map(|index| index as u32 + 1)
    }

    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }
}

fn position_of(tickets: &VecDeque<Ticket>, connection: ConnectionId) -> Option<usize> {
    tickets
        .iter()
        .position(|ticket| ticket.connection == connection)
}

/// Removes the oldest ticket together with the oldest later ticket of a
/// different user. A user is never paired with themselves.
fn take_pair(tickets: &mut VecDeque<Ticket>) -> Option<(Ticket, Ticket)> {
    for first in 0..tickets.len() {
        let partner = (first + 1..tickets.len())
            .find(|&other| tickets[other].user_id != tickets[first].user_id);

        if let Some(second) = partner {
            // Remove the later index first so the earlier one stays valid
            let second_ticket = tickets.remove(second)?;
            let first_ticket = tickets.remove(first)?;
            return Some((first_ticket, second_ticket));
        }
    }
    None
}
