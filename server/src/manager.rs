//! Session manager: matchmaking, seat assignment, turn authority and rematch
//!
//! Every inbound client message ends up here. The manager owns no transport;
//! it talks to clients only through the [`Router`] and learns who a
//! connection is from the [`ConnectionRegistry`].
//!
//! Locking:
//! - Each session has its own mutex in the [`SessionStore`]; turn checks and
//!   state changes happen under it, and broadcasts are queued before it is
//!   released so members see updates in application order.
//! - Registry and router locks are taken for short sections, possibly while
//!   a session lock is held, never the other way around.
//! - The matchmaking queue lock is never held while another lock is taken.

use crate::authority::{PositionAuthority, TerminalStatus};
use crate::error::JoinError;
use crate::matchmaking::{Enqueued, MatchmakingQueue, Ticket};
use crate::persistence::{unix_millis, GameRecord, PersistenceQueue, PersistenceRecord};
use crate::registry::ConnectionRegistry;
use crate::router::{Outbox, Router};
use crate::session::{ConnectionId, Seat, Session, SessionId, SessionStatus, UserId};
use crate::store::{SessionHandle, SessionStore};
use log::{debug, error, info, warn};
use shared::{GameResult, Packet, RejectReason, SeatColor};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

/// Short codes tried before falling back to a UUID
const SHORT_CODE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdKind {
    /// Human friendly code for sessions shared by hand
    ShortCode,
    Uuid,
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    queue: MatchmakingQueue,
    registry: RwLock<ConnectionRegistry>,
    router: RwLock<Router>,
    authority: Arc<dyn PositionAuthority>,
    persistence: PersistenceQueue,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        authority: Arc<dyn PositionAuthority>,
        persistence: PersistenceQueue,
        max_connections: usize,
    ) -> Self {
        Self {
            store,
            queue: MatchmakingQueue::new(),
            registry: RwLock::new(ConnectionRegistry::new(max_connections)),
            router: RwLock::new(Router::new()),
            authority,
            persistence,
        }
    }

    /// Registers a new connection and its outbox. Returns `None` when the
    /// server is full.
    pub async fn connect(&self, addr: SocketAddr, outbox: Outbox) -> Option<ConnectionId> {
        let connection = self.registry.write().await.register(addr)?;
        self.router.write().await.add_connection(connection, outbox);
        Some(connection)
    }

    /// Forgets the connection. Its seats stay reserved for a reconnect.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let closed = self.registry.write().await.unbind(connection);
        self.queue.dequeue(connection).await;
        self.router.write().await.remove_connection(connection);

        let Some(session_id) = closed.and_then(|closed| closed.session) else {
            return;
        };
        if let Some(handle) = self.store.get(&session_id).await {
            let mut session = handle.lock().await;
            if let Some(color) = session.mark_disconnected(connection) {
                info!(
                    "Seat {} of session {} kept for reconnect",
                    color, session_id
                );
            }
        }
    }

    /// Routes one decoded client message
    pub async fn handle_packet(&self, connection: ConnectionId, packet: Packet) {
        match packet {
            Packet::Identify { user_id } => self.identify(connection, user_id).await,
            Packet::CreateSession {} => self.create_session(connection).await,
            Packet::JoinSession { session_id } => {
                self.join_session(connection, SessionId::from(session_id))
                    .await
            }
            Packet::FindMatch {} => self.find_match(connection).await,
            Packet::LeaveQueue {} => self.leave_queue(connection).await,
            Packet::SubmitMove { session_id, mv } => {
                self.submit_move(connection, SessionId::from(session_id), &mv)
                    .await
            }
            Packet::Rematch { session_id } => {
                self.rematch(connection, SessionId::from(session_id)).await
            }
            Packet::ResumeSession { session_id } => {
                self.resume_session(connection, SessionId::from(session_id))
                    .await
            }
            _ => {
                warn!("Unexpected packet type from connection {}", connection);
            }
        }
    }

    /// Binds the connection to a user identity. Refused while the connection
    /// is queued or playing, since seats are owned by identity.
    pub async fn identify(&self, connection: ConnectionId, user_id: UserId) {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            warn!("Connection {} sent an empty identity", connection);
            return;
        }

        if let Err(e) = self.release_finished_membership(connection).await {
            self.reject(connection, e).await;
            return;
        }
        if self.queue.position(connection).await.is_some() {
            self.reject(connection, JoinError::AlreadyInSession).await;
            return;
        }

        if self.registry.write().await.bind(connection, user_id.clone()) {
            self.reply(connection, Packet::Identified { user_id }).await;
        }
    }

    /// Opens a session with the caller as first mover. Asking again while
    /// still waiting for an opponent returns the same session.
    pub async fn create_session(&self, connection: ConnectionId) {
        let Some(user_id) = self.resolve(connection).await else {
            return;
        };

        if let Some(existing) = self.awaiting_session_of(connection).await {
            debug!(
                "Connection {} already waits in session {}",
                connection, existing
            );
            self.reply(
                connection,
                Packet::SessionCreated {
                    session_id: existing.to_string(),
                    seat_color: SeatColor::FirstMover,
                },
            )
            .await;
            return;
        }

        if let Err(e) = self.release_finished_membership(connection).await {
            self.reject(connection, e).await;
            return;
        }
        self.queue.dequeue(connection).await;

        let handle = self
            .insert_session(IdKind::ShortCode, |id| {
                Session::new(
                    id,
                    self.authority.initial_position(),
                    Seat::new(user_id.clone(), connection),
                )
            })
            .await;
        let session = handle.lock().await;
        let session_id = session.id.clone();

        if !self.registry.write().await.claim(connection, &session_id) {
            drop(session);
            self.store.remove(&session_id).await;
            self.reject(connection, JoinError::AlreadyInSession).await;
            return;
        }

        {
            let mut router = self.router.write().await;
            router.join_room(&session_id, connection);
            router.send_to_connection(
                connection,
                Packet::SessionCreated {
                    session_id: session_id.to_string(),
                    seat_color: SeatColor::FirstMover,
                },
            );
        }

        info!("Session {} created by {}", session_id, user_id);
        self.record(PersistenceRecord::session_created(
            session_id.as_str(),
            session.seat_user_ids(),
        ));
    }

    /// Takes the second seat of an awaiting session
    pub async fn join_session(&self, connection: ConnectionId, session_id: SessionId) {
        let Some(user_id) = self.resolve(connection).await else {
            return;
        };

        let already_member =
            self.registry.read().await.membership(connection).as_ref() == Some(&session_id);
        if !already_member {
            if let Err(e) = self.release_finished_membership(connection).await {
                self.reject(connection, e).await;
                return;
            }
        }
        self.queue.dequeue(connection).await;

        let Some(handle) = self.store.get(&session_id).await else {
            self.reject(connection, JoinError::NotFound).await;
            return;
        };
        let mut session = handle.lock().await;

        if !already_member && !self.registry.write().await.claim(connection, &session_id) {
            drop(session);
            self.reject(connection, JoinError::AlreadyInSession).await;
            return;
        }

        if let Err(e) = session.seat_opponent(Seat::new(user_id.clone(), connection)) {
            if !already_member {
                self.registry.write().await.release(connection, &session_id);
            }
            drop(session);
            debug!(
                "Connection {} could not join session {}: {}",
                connection, session_id, e
            );
            self.reject(connection, e).await;
            return;
        }

        info!("{} joined session {}", user_id, session_id);
        let mut router = self.router.write().await;
        router.join_room(&session_id, connection);
        for (color, member) in session.connections() {
            router.send_to_connection(member, session.started_packet(color));
        }
    }

    /// Queues the caller for an anonymous opponent, starting a session as
    /// soon as one is available
    pub async fn find_match(&self, connection: ConnectionId) {
        let Some(user_id) = self.resolve(connection).await else {
            return;
        };

        if let Err(e) = self.release_finished_membership(connection).await {
            self.reject(connection, e).await;
            return;
        }

        match self.queue.enqueue(Ticket::new(connection, user_id)).await {
            Enqueued::Waiting(position) | Enqueued::AlreadyQueued(position) => {
                self.reply(connection, Packet::Queued { position }).await;
            }
            Enqueued::Paired(first, second) => self.start_match(first, second).await,
        }
    }

    pub async fn leave_queue(&self, connection: ConnectionId) {
        if !self.queue.dequeue(connection).await {
            debug!("Connection {} was not queued", connection);
        }
    }

    /// Creates an active session for a pair from the queue. If one side can
    /// no longer take a membership the other goes back to the head of the
    /// queue and may be paired again right away.
    async fn start_match(&self, first: Ticket, second: Ticket) {
        let mut pair = Some((first, second));

        while let Some((first, second)) = pair.take() {
            let handle = self
                .insert_session(IdKind::Uuid, |id| {
                    Session::with_players(
                        id,
                        self.authority.initial_position(),
                        Seat::new(first.user_id.clone(), first.connection),
                        Seat::new(second.user_id.clone(), second.connection),
                    )
                })
                .await;
            let session = handle.lock().await;
            let session_id = session.id.clone();

            let (first_ok, second_ok) = {
                let mut registry = self.registry.write().await;
                (
                    registry.claim(first.connection, &session_id),
                    registry.claim(second.connection, &session_id),
                )
            };

            if first_ok && second_ok {
                {
                    let mut router = self.router.write().await;
                    for (color, member) in session.connections() {
                        router.join_room(&session_id, member);
                        router.send_to_connection(member, session.started_packet(color));
                    }
                }
                info!(
                    "Matched {} with {} in session {}",
                    first.user_id, second.user_id, session_id
                );
                self.record(PersistenceRecord::session_created(
                    session_id.as_str(),
                    session.seat_user_ids(),
                ));
                return;
            }

            {
                let mut registry = self.registry.write().await;
                registry.release(first.connection, &session_id);
                registry.release(second.connection, &session_id);
            }
            drop(session);
            self.store.remove(&session_id).await;

            let survivor = match (first_ok, second_ok) {
                (true, _) => first,
                (_, true) => second,
                _ => continue,
            };
            debug!(
                "Pairing for session {} fell through, requeueing connection {}",
                session_id, survivor.connection
            );

            let connection = survivor.connection;
            pair = self.queue.requeue_front(survivor).await;
            if pair.is_none() {
                if let Some(position) = self.queue.position(connection).await {
                    self.reply(connection, Packet::Queued { position }).await;
                }
            }
        }
    }

    /// Applies a move if the caller holds the turn and the authority accepts
    /// it. Anything else is dropped without telling the client.
    pub async fn submit_move(&self, connection: ConnectionId, session_id: SessionId, mv: &str) {
        let Some(handle) = self.store.get(&session_id).await else {
            debug!("Move for unknown session {} dropped", session_id);
            return;
        };
        let mut session = handle.lock().await;

        if session.is_retired() || session.status != SessionStatus::Active {
            debug!("Move for inactive session {} dropped", session_id);
            return;
        }

        let Some(turn) = self.authority.turn_owner(&session.position) else {
            warn!("Session {} holds an unreadable position", session_id);
            return;
        };
        if session.seat_of_connection(connection) != Some(turn) {
            debug!(
                "Out of turn move from connection {} in session {} dropped",
                connection, session_id
            );
            return;
        }

        let applied = match self.authority.apply_move(&session.position, mv) {
            Ok(applied) => applied,
            Err(e) => {
                debug!("Move {:?} in session {} rejected: {}", mv, session_id, e);
                return;
            }
        };
        session.record_move(applied);

        let result = self
            .authority
            .terminal_status(&session.position)
            .map(|status| match status {
                TerminalStatus::Checkmate => GameResult::win_for(turn),
                TerminalStatus::Draw => GameResult::Draw,
            });
        if let Some(result) = result {
            session.complete(result);
        }

        {
            let router = self.router.read().await;
            router.send_to_session(&session_id, &session.state_packet());
            if let Some(result) = result {
                router.send_to_session(
                    &session_id,
                    &Packet::GameOver {
                        session_id: session_id.to_string(),
                        result,
                    },
                );
            }
        }

        if let Some(result) = result {
            info!(
                "Session {} completed: {} after {} plies",
                session_id, result, session.ply
            );
            self.record(PersistenceRecord::SessionResult(GameRecord {
                session_id: session_id.to_string(),
                seat_user_ids: session.seat_user_ids(),
                result,
                final_position_state: session.position.clone(),
                move_history: session.history.clone(),
                ended_at: unix_millis(SystemTime::now()),
            }));
        }
    }

    /// Replaces a session with a fresh one between the same players,
    /// colours swapped. The old session is gone afterwards.
    pub async fn rematch(&self, connection: ConnectionId, old_id: SessionId) {
        let Some(old_handle) = self.store.get(&old_id).await else {
            debug!("Rematch of unknown session {} dropped", old_id);
            return;
        };
        let mut old = old_handle.lock().await;

        if old.is_retired() || old.seat_of_connection(connection).is_none() {
            debug!(
                "Rematch of session {} by connection {} dropped",
                old_id, connection
            );
            return;
        }
        let Some((first, second)) = old.swapped_seats() else {
            debug!("Rematch of session {} without an opponent dropped", old_id);
            return;
        };
        old.retire();

        let new_handle = self
            .insert_session(IdKind::Uuid, |id| {
                Session::with_players(
                    id,
                    self.authority.initial_position(),
                    first.clone(),
                    second.clone(),
                )
            })
            .await;
        let mut new = new_handle.lock().await;
        let new_id = new.id.clone();

        // A player who already moved on keeps the seat but is not pulled back
        {
            let mut registry = self.registry.write().await;
            for (_, member) in new.connections() {
                if !registry.migrate(member, &old_id, &new_id) {
                    new.mark_disconnected(member);
                }
            }
        }

        {
            let mut router = self.router.write().await;
            for (color, member) in new.connections() {
                router.migrate(member, &old_id, &new_id);
                router.send_to_connection(member, new.started_packet(color));
            }
            router.close_room(&old_id);
        }

        info!("Session {} superseded by rematch {}", old_id, new_id);
        self.record(PersistenceRecord::session_created(
            new_id.as_str(),
            new.seat_user_ids(),
        ));

        drop(new);
        drop(old);
        self.store.remove(&old_id).await;
    }

    /// Rebinds the caller's seat after a reconnect and resyncs the state
    pub async fn resume_session(&self, connection: ConnectionId, session_id: SessionId) {
        let Some(user_id) = self.resolve(connection).await else {
            return;
        };

        let already_member =
            self.registry.read().await.membership(connection).as_ref() == Some(&session_id);
        if !already_member {
            if let Err(e) = self.release_finished_membership(connection).await {
                self.reject(connection, e).await;
                return;
            }
        }
        self.queue.dequeue(connection).await;

        let Some(handle) = self.store.get(&session_id).await else {
            self.reject(connection, JoinError::NotFound).await;
            return;
        };
        let mut session = handle.lock().await;

        let seat = if session.is_retired() {
            None
        } else {
            session.seat_of_user(&user_id)
        };
        let Some(color) = seat else {
            drop(session);
            self.reject(connection, JoinError::NotFound).await;
            return;
        };

        let previous = session
            .seat(color)
            .and_then(|seat| seat.connection)
            .filter(|previous| *previous != connection);
        {
            let mut registry = self.registry.write().await;
            if !registry.claim(connection, &session_id) {
                drop(registry);
                drop(session);
                self.reject(connection, JoinError::AlreadyInSession).await;
                return;
            }
            if let Some(previous) = previous {
                registry.release(previous, &session_id);
            }
        }

        session.rebind(color, connection);
        info!(
            "{} resumed seat {} of session {} on connection {}",
            user_id, color, session_id, connection
        );

        let mut router = self.router.write().await;
        if let Some(previous) = previous {
            router.leave_room(&session_id, previous);
        }
        router.join_room(&session_id, connection);
        router.send_to_connection(connection, session.started_packet(color));
    }

    /// Discards sessions nobody has been connected to for `timeout`.
    /// Returns how many were removed.
    pub async fn reap_abandoned(&self, timeout: Duration) -> usize {
        let mut abandoned = Vec::new();
        for handle in self.store.all().await {
            let mut session = handle.lock().await;
            if !session.is_retired() && session.is_abandoned(timeout) {
                session.retire();
                abandoned.push(session.id.clone());
            }
        }

        for session_id in &abandoned {
            self.store.remove(session_id).await;
            self.router.write().await.close_room(session_id);
            info!("Discarded abandoned session {}", session_id);
        }
        abandoned.len()
    }

    pub async fn session_count(&self) -> usize {
        self.store.len().await
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.len().await
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.len()
    }

    async fn resolve(&self, connection: ConnectionId) -> Option<UserId> {
        let user_id = self.registry.read().await.resolve(connection);
        if user_id.is_none() {
            debug!("Message from unknown connection {} ignored", connection);
        }
        user_id
    }

    /// Session the connection created and is still waiting in, if any
    async fn awaiting_session_of(&self, connection: ConnectionId) -> Option<SessionId> {
        let current = self.registry.read().await.membership(connection)?;
        let handle = self.store.get(&current).await?;
        let session = handle.lock().await;

        let waiting = session.status == SessionStatus::AwaitingOpponent
            && !session.is_retired()
            && session.seat_of_connection(connection) == Some(SeatColor::FirstMover);
        waiting.then_some(current)
    }

    /// Lets go of a membership whose session is over. Fails if the
    /// connection still plays in an unfinished session.
    ///
    /// The old seat is detached so the finished session can be reaped once
    /// its other player leaves too.
    async fn release_finished_membership(
        &self,
        connection: ConnectionId,
    ) -> Result<(), JoinError> {
        let Some(current) = self.registry.read().await.membership(connection) else {
            return Ok(());
        };

        let finished = match self.store.get(&current).await {
            Some(handle) => {
                let mut session = handle.lock().await;
                let finished = session.is_retired() || session.status == SessionStatus::Completed;
                if finished {
                    session.mark_disconnected(connection);
                }
                finished
            }
            None => true,
        };
        if !finished {
            return Err(JoinError::AlreadyInSession);
        }

        self.registry.write().await.release(connection, &current);
        self.router.write().await.leave_room(&current, connection);
        Ok(())
    }

    /// Inserts a session under a fresh id. Short codes are retried a few
    /// times before falling back to a UUID.
    async fn insert_session(
        &self,
        kind: IdKind,
        build: impl Fn(SessionId) -> Session,
    ) -> SessionHandle {
        if kind == IdKind::ShortCode {
            for _ in 0..SHORT_CODE_ATTEMPTS {
                if let Some(handle) = self.store.insert(build(SessionId::short_code())).await {
                    return handle;
                }
            }
            error!(
                "No free session code after {} attempts, using a UUID",
                SHORT_CODE_ATTEMPTS
            );
        }

        loop {
            if let Some(handle) = self.store.insert(build(SessionId::uuid())).await {
                return handle;
            }
        }
    }

    async fn reply(&self, connection: ConnectionId, packet: Packet) {
        self.router.read().await.send_to_connection(connection, packet);
    }

    async fn reject(&self, connection: ConnectionId, err: JoinError) {
        let reason = RejectReason::from(err);
        self.reply(connection, Packet::Rejected { reason }).await;
    }

    fn record(&self, record: PersistenceRecord) {
        // Failures are already logged by the queue
        let _ = self.persistence.submit(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::ChessAuthority;
    use crate::persistence::{MemoryGateway, PersistenceWorker};
    use crate::store::InMemorySessionStore;
    use tokio::sync::mpsc;

    struct Harness {
        manager: SessionManager,
        gateway: Arc<MemoryGateway>,
        worker: PersistenceWorker,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(MemoryGateway::new());
        let (queue, worker) = PersistenceWorker::spawn(gateway.clone(), 64);
        let manager = SessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ChessAuthority::new()),
            queue,
            16,
        );
        Harness {
            manager,
            gateway,
            worker,
        }
    }

    async fn connect(
        manager: &SessionManager,
        user: &str,
    ) -> (ConnectionId, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(32);
        let connection = manager
            .connect("127.0.0.1:9000".parse().unwrap(), tx)
            .await
            .unwrap();
        manager.identify(connection, user.to_string()).await;
        (connection, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Packet>) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    fn created_id(packets: &[Packet]) -> SessionId {
        packets
            .iter()
            .find_map(|packet| match packet {
                Packet::SessionCreated { session_id, .. } => {
                    Some(SessionId::from(session_id.as_str()))
                }
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_identify_replies() {
        let h = harness();
        let (_, mut rx) = connect(&h.manager, "alice").await;
        assert_eq!(
            drain(&mut rx),
            vec![Packet::Identified {
                user_id: "alice".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_create_session_is_idempotent() {
        let h = harness();
        let (alice, mut rx) = connect(&h.manager, "alice").await;

        h.manager.create_session(alice).await;
        let first = created_id(&drain(&mut rx));
        h.manager.create_session(alice).await;
        let second = created_id(&drain(&mut rx));

        assert_eq!(first, second);
        assert_eq!(h.manager.session_count().await, 1);
        assert_eq!(h.manager.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_identify_refused_while_waiting() {
        let h = harness();
        let (alice, mut rx) = connect(&h.manager, "alice").await;
        h.manager.create_session(alice).await;
        drain(&mut rx);

        h.manager.identify(alice, "mallory".to_string()).await;
        assert_eq!(
            drain(&mut rx),
            vec![Packet::Rejected {
                reason: RejectReason::AlreadyInSession
            }]
        );
    }

    #[tokio::test]
    async fn test_disconnect_dequeues() {
        let h = harness();
        let (alice, _rx) = connect(&h.manager, "alice").await;
        h.manager.find_match(alice).await;
        assert_eq!(h.manager.queue_len().await, 1);

        h.manager.disconnect(alice).await;
        assert_eq!(h.manager.queue_len().await, 0);
        assert_eq!(h.manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_reap_abandoned_waiting_session() {
        let h = harness();
        let (alice, _rx) = connect(&h.manager, "alice").await;
        h.manager.create_session(alice).await;

        assert_eq!(h.manager.reap_abandoned(Duration::ZERO).await, 0);
        h.manager.disconnect(alice).await;
        assert_eq!(h.manager.reap_abandoned(Duration::ZERO).await, 1);
        assert_eq!(h.manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_rematch_keeps_moved_on_player_detached() {
        let h = harness();
        let (alice, mut alice_rx) = connect(&h.manager, "alice").await;
        let (bob, mut bob_rx) = connect(&h.manager, "bob").await;

        h.manager.create_session(alice).await;
        let session_id = created_id(&drain(&mut alice_rx));
        h.manager.join_session(bob, session_id.clone()).await;

        // Fool's mate, bob (black) wins
        for (connection, mv) in [(alice, "f2f3"), (bob, "e7e5"), (alice, "g2g4"), (bob, "d8h4")] {
            h.manager.submit_move(connection, session_id.clone(), mv).await;
        }
        drain(&mut alice_rx);
        assert!(drain(&mut bob_rx)
            .iter()
            .any(|p| matches!(p, Packet::GameOver { result: GameResult::SecondMoverWins, .. })));

        // Alice moves on to matchmaking before bob asks for a rematch
        h.manager.find_match(alice).await;
        drain(&mut alice_rx);
        h.manager.rematch(bob, session_id.clone()).await;

        let bob_packets = drain(&mut bob_rx);
        assert!(matches!(
            bob_packets.as_slice(),
            [Packet::SessionStarted { seat_color: SeatColor::FirstMover, .. }]
        ));
        assert!(drain(&mut alice_rx).is_empty());

        drop(h.manager);
        h.worker.shutdown().await;
        assert_eq!(h.gateway.results().await.len(), 1);
    }
}
