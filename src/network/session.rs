//! Game Session
//!
//! One shared board played by every connected client. Each connection gets
//! an actor task that consumes its actions and its own reveal timeouts in
//! order, so a connection never races with itself.
//!
//! Actions are stamped when they are received and served before timeouts.
//! A reveal that arrived inside the window pairs even if the actor only
//! gets to it after the timer fired; one that arrived after the deadline
//! never does.
//!
//! ## Locking
//!
//! Locks are always taken in this order and never held across an `.await`:
//!
//! 1. the connection's session entry ([`SessionRegistry::with_session`])
//! 2. the board overlay ([`Board::overlay`])
//! 3. the registry map (read, inside [`SessionRegistry::broadcast`])
//!
//! Broadcasts only enqueue, so a hide is checked against the overlay and
//! queued while the overlay lock is still held. A match marking the same
//! cell serializes on that lock, and no hide is queued after it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::game::board::{Board, BoardSnapshot, Position};
use crate::game::reveal::{RevealOutcome, SessionState};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::registry::{ConnectionId, SessionRegistry};
use crate::proof::settlement::SettlementLog;
use crate::{COLS, REVEAL_TIMEOUT, ROWS};

/// Game configuration.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Board rows.
    pub rows: usize,
    /// Board columns.
    pub cols: usize,
    /// How long an unpaired reveal stays face up.
    pub reveal_timeout: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rows: ROWS,
            cols: COLS,
            reveal_timeout: REVEAL_TIMEOUT,
        }
    }
}

/// An inbound action and when it was received.
#[derive(Debug)]
struct Action {
    message: ClientMessage,
    received_at: Instant,
}

/// Queue of one connection's inbound actions.
#[derive(Debug, Clone)]
pub struct ActionSender(mpsc::Sender<Action>);

impl ActionSender {
    /// Queue `message`, stamped as received now.
    pub async fn send(&self, message: ClientMessage) -> Result<(), mpsc::error::SendError<ClientMessage>> {
        self.send_at(message, Instant::now()).await
    }

    /// Queue `message` received at `received_at`.
    pub async fn send_at(
        &self,
        message: ClientMessage,
        received_at: Instant,
    ) -> Result<(), mpsc::error::SendError<ClientMessage>> {
        self.0
            .send(Action { message, received_at })
            .await
            .map_err(|e| mpsc::error::SendError(e.0.message))
    }
}

/// A joined player, as seen by the transport.
#[derive(Debug)]
pub struct PlayerHandle {
    /// Connection id.
    pub id: ConnectionId,
    /// Inbound actions, consumed in order by the connection's actor.
    pub actions: ActionSender,
    /// Outbound events. The board snapshot is always first.
    pub outbound: mpsc::Receiver<ServerMessage>,
    /// The actor task. Ends after `actions` is dropped or the connection
    /// is deregistered.
    pub task: JoinHandle<()>,
}

/// Expiry notifications from this connection's timers.
type TimerSender = mpsc::UnboundedSender<u64>;

/// The shared game.
pub struct GameSession {
    board: Board,
    registry: SessionRegistry,
    settlements: SettlementLog,
    config: GameConfig,
    action_buffer: usize,
}

impl GameSession {
    /// Create a session around a generated board.
    ///
    /// `buffer` bounds both the per-connection outbound queue and the
    /// inbound action queue.
    pub fn new(board: Board, config: GameConfig, buffer: usize) -> Arc<Self> {
        info!(
            "Game session ready: {}x{} board, {} pairs, reveal timeout {:?}",
            board.rows(),
            board.cols(),
            board.pair_count(),
            config.reveal_timeout
        );
        Arc::new(Self {
            board,
            registry: SessionRegistry::new(buffer),
            settlements: SettlementLog::new(),
            config,
            action_buffer: buffer.max(1),
        })
    }

    /// The board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Connected players.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Proofs of every match so far.
    pub fn settlements(&self) -> &SettlementLog {
        &self.settlements
    }

    /// Game configuration.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Current board state for a joining client.
    pub fn snapshot(&self) -> BoardSnapshot {
        self.board.snapshot()
    }

    /// Whether every pair has been matched.
    pub fn is_finished(&self) -> bool {
        self.board.overlay().is_complete()
    }

    /// Register a new player, queue the board snapshot and start its actor.
    pub fn join(self: &Arc<Self>) -> PlayerHandle {
        let id = Uuid::new_v4();
        let outbound = self.registry.register(id);
        if let Err(e) = self.registry.send(&id, ServerMessage::Board(self.snapshot())) {
            error!("Failed to queue board snapshot for {}: {}", id, e);
        }

        let (actions, actions_rx) = mpsc::channel(self.action_buffer);
        let task = tokio::spawn(self.clone().run_actor(id, actions_rx));

        info!("Player {} joined ({} connected)", id, self.registry.len());
        PlayerHandle { id, actions: ActionSender(actions), outbound, task }
    }

    /// Deregister a player, cancelling its pending timeout.
    pub fn leave(&self, id: ConnectionId) {
        if self.registry.unregister(&id) {
            info!("Player {} left ({} connected)", id, self.registry.len());
        }
    }

    /// Per-connection actor: queued actions first, then timeouts, one at a time.
    async fn run_actor(self: Arc<Self>, id: ConnectionId, mut actions: mpsc::Receiver<Action>) {
        let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                biased;

                action = actions.recv() => match action {
                    Some(action) => self.handle_action(id, action, &timer_tx),
                    None => break,
                },
                Some(generation) = timer_rx.recv() => {
                    self.expire(id, generation);
                }
            }

            if !self.registry.contains(&id) {
                debug!("Actor for {} stopping: connection deregistered", id);
                break;
            }
        }

        self.leave(id);
    }

    fn handle_action(&self, id: ConnectionId, action: Action, timers: &TimerSender) {
        let Action { message, received_at } = action;
        match message {
            ClientMessage::Hello { name } => {
                info!("Player {} is {}", id, name);
                self.registry.with_session(&id, |state| state.set_name(name));
            }
            ClientMessage::HoverCard { row, col } => {
                if let Some(pos) = self.valid_position(id, row, col) {
                    self.broadcast(ServerMessage::hover(pos));
                }
            }
            ClientMessage::LeaveCard { row, col } => {
                if let Some(pos) = self.valid_position(id, row, col) {
                    self.broadcast(ServerMessage::leave(pos));
                }
            }
            ClientMessage::RevealCard { row, col } => {
                if let Some(pos) = self.valid_position(id, row, col) {
                    self.reveal(id, pos, received_at, timers);
                }
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unknown event from {}", id);
            }
        }
    }

    fn valid_position(&self, id: ConnectionId, row: usize, col: usize) -> Option<Position> {
        let pos = self.board.position(row, col);
        if pos.is_none() {
            debug!("Ignoring out-of-range cell ({}, {}) from {}", row, col, id);
        }
        pos
    }

    fn reveal(&self, id: ConnectionId, pos: Position, received_at: Instant, timers: &TimerSender) {
        let mut failed = Vec::new();
        let mut matched = None;

        self.registry.with_session(&id, |state| {
            let mut overlay = self.board.overlay();
            let step = state.reveal(pos, received_at, &self.board, &overlay);

            for stale in step.flushed {
                if !overlay.is_revealed(stale) {
                    failed.extend(self.registry.broadcast(&ServerMessage::hide(stale)));
                }
            }

            match step.outcome {
                RevealOutcome::Ignored => {
                    debug!("Reveal of {} by {} ignored", pos, id);
                }
                RevealOutcome::Armed(first) => {
                    failed.extend(self.broadcast_reveal(first));
                    self.arm(state, timers);
                }
                RevealOutcome::Matched { first, second } => {
                    failed.extend(self.broadcast_reveal(second));
                    if overlay.mark_matched(first, second) {
                        matched = Some((first, second, overlay.is_complete(), overlay.matched_pairs()));
                    }
                }
                RevealOutcome::Mismatched { first, second } => {
                    failed.extend(self.broadcast_reveal(second));
                    debug!("{} and {} do not match", first, second);
                    self.arm(state, timers);
                }
            }
        });

        if let Some((first, second, finished, pairs)) = matched {
            info!("Player {} matched {} and {}", id, first, second);
            if let Err(e) = self.settlements.settle(&self.board, first, second) {
                error!("Failed to settle match {} <-> {}: {}", first, second, e);
            }
            if finished {
                info!("All {} pairs matched", pairs);
                failed.extend(self.registry.broadcast(&ServerMessage::GameFinished { pairs }));
            }
        }

        self.registry.prune(failed);
    }

    fn broadcast_reveal(&self, pos: Position) -> Vec<ConnectionId> {
        match self.board.attribute(pos) {
            Some(attribute) => self.registry.broadcast(&ServerMessage::reveal(pos, attribute.clone())),
            None => Vec::new(),
        }
    }

    /// Spawn the connection's single live timeout.
    fn arm(&self, state: &mut SessionState, timers: &TimerSender) {
        let generation = state.next_generation();
        let expires_at = Instant::now() + self.config.reveal_timeout;
        let timers = timers.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let _ = timers.send(generation);
        });
        state.set_deadline(generation, expires_at, timer.abort_handle());
    }

    fn expire(&self, id: ConnectionId, generation: u64) {
        let mut failed = Vec::new();

        self.registry.with_session(&id, |state| {
            let positions = state.expire(generation);
            if positions.is_empty() {
                return;
            }

            let overlay = self.board.overlay();
            for pos in positions {
                if overlay.is_revealed(pos) {
                    debug!("Skipping hide of matched cell {}", pos);
                    continue;
                }
                failed.extend(self.registry.broadcast(&ServerMessage::hide(pos)));
            }
        });

        self.registry.prune(failed);
    }

    fn broadcast(&self, message: ServerMessage) {
        let failed = self.registry.broadcast(&message);
        self.registry.prune(failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::attribute::Attribute;
    use rand::rngs::OsRng;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn session(rows: usize, cols: usize) -> Arc<GameSession> {
        session_with_timeout(rows, cols, TIMEOUT)
    }

    fn session_with_timeout(rows: usize, cols: usize, reveal_timeout: Duration) -> Arc<GameSession> {
        let pairs = (rows * cols / 2) as u64;
        let attributes = (1..=pairs).map(|i| Attribute::named(i, format!("Blobert #{i}"))).collect();
        let board = Board::from_attributes(attributes, rows, cols, &mut OsRng).unwrap();
        let config = GameConfig { rows, cols, reveal_timeout };
        GameSession::new(board, config, 64)
    }

    fn pair(game: &GameSession, id: u64) -> (Position, Position) {
        let p = game.board().positions_of(id);
        (p[0], p[1])
    }

    /// Let every ready task run, advancing the paused clock by `ms`.
    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn hides(messages: &[ServerMessage]) -> Vec<Position> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::HideCard { row, col, .. } => Some(Position::new(*row, *col)),
                _ => None,
            })
            .collect()
    }

    fn reveals(messages: &[ServerMessage]) -> Vec<Position> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::RevealCard { row, col, .. } => Some(Position::new(*row, *col)),
                _ => None,
            })
            .collect()
    }

    async fn join(game: &Arc<GameSession>) -> PlayerHandle {
        let mut player = game.join();
        let first = player.outbound.recv().await.unwrap();
        assert!(matches!(first, ServerMessage::Board(_)));
        player
    }

    async fn reveal(player: &PlayerHandle, pos: Position) {
        player
            .actions
            .send(ClientMessage::RevealCard { row: pos.row, col: pos.col })
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_sends_snapshot_first() {
        let game = session(2, 4);
        let mut player = game.join();

        match player.outbound.recv().await.unwrap() {
            ServerMessage::Board(snapshot) => {
                assert_eq!((snapshot.rows, snapshot.cols), (2, 4));
                assert_eq!(snapshot.cells.len(), 8);
                assert!(snapshot.cells.iter().all(|c| c.attribute.is_none()));
            }
            other => panic!("expected board snapshot, got {other:?}"),
        }
        assert!(game.registry().contains(&player.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_is_never_hidden() {
        let game = session(2, 4);
        let mut player = join(&game).await;
        let (a, b) = pair(&game, 3);

        reveal(&player, a).await;
        reveal(&player, b).await;
        settle(5_000).await;

        let messages = drain(&mut player.outbound);
        assert_eq!(reveals(&messages), vec![a, b]);
        assert!(hides(&messages).is_empty());
        assert!(game.board().overlay().is_revealed(a));
        assert!(game.board().overlay().is_revealed(b));

        let records = game.settlements().records();
        assert_eq!(records.len(), 1);
        assert!(records[0].verified);
        assert_eq!(records[0].attribute_id, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_hides_both_after_timeout() {
        let game = session(2, 4);
        let mut player = join(&game).await;
        let (a, _) = pair(&game, 1);
        let (c, _) = pair(&game, 2);

        reveal(&player, a).await;
        reveal(&player, c).await;
        settle(1_500).await;
        let early = drain(&mut player.outbound);
        assert_eq!(reveals(&early), vec![a, c]);
        assert!(hides(&early).is_empty());

        settle(1_000).await;
        let mut hidden = hides(&drain(&mut player.outbound));
        hidden.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(hidden, expected);
        assert!(!game.board().overlay().is_revealed(a));
        assert!(game.settlements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_reveal_hides_exactly_once() {
        let game = session(2, 4);
        let mut player = join(&game).await;
        let (a, _) = pair(&game, 4);

        reveal(&player, a).await;
        settle(1_999).await;
        let early = drain(&mut player.outbound);
        assert_eq!(reveals(&early), vec![a]);
        assert!(hides(&early).is_empty());

        settle(2).await;
        assert_eq!(hides(&drain(&mut player.outbound)), vec![a]);

        settle(10_000).await;
        assert!(drain(&mut player.outbound).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_reveal_restarts_the_timeout() {
        let game = session(2, 4);
        let mut player = join(&game).await;
        let (a, _) = pair(&game, 1);
        let (c, _) = pair(&game, 2);

        reveal(&player, a).await;
        settle(1_500).await;
        reveal(&player, c).await;
        // Past the first reveal's deadline, before the pair's
        settle(1_000).await;
        assert!(hides(&drain(&mut player.outbound)).is_empty());

        settle(1_500).await;
        assert_eq!(hides(&drain(&mut player.outbound)).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_players_do_not_pair_across_connections() {
        let game = session(2, 4);
        let mut alice = join(&game).await;
        let bob = join(&game).await;
        let (a, b) = pair(&game, 2);

        reveal(&alice, a).await;
        reveal(&bob, b).await;
        settle(5_000).await;

        let seen = drain(&mut alice.outbound);
        let mut revealed = reveals(&seen);
        revealed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(revealed, expected);
        assert_eq!(hides(&seen).len(), 2);
        assert!(!game.board().overlay().is_revealed(a));
        assert!(game.settlements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_timeout() {
        let game = session(2, 4);
        let mut observer = join(&game).await;
        let player = join(&game).await;
        let (a, _) = pair(&game, 1);

        reveal(&player, a).await;
        settle(10).await;

        let PlayerHandle { id, actions, task, .. } = player;
        drop(actions);
        task.await.unwrap();
        assert!(!game.registry().contains(&id));

        settle(5_000).await;
        let seen = drain(&mut observer.outbound);
        assert_eq!(reveals(&seen), vec![a]);
        assert!(hides(&seen).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_hide_suppressed_after_match_elsewhere() {
        let game = session(2, 4);
        let mut alice = join(&game).await;
        let bob = join(&game).await;
        let (a, b) = pair(&game, 4);

        reveal(&alice, a).await;
        settle(500).await;
        reveal(&bob, a).await;
        reveal(&bob, b).await;
        settle(5_000).await;

        let seen = drain(&mut alice.outbound);
        assert!(hides(&seen).is_empty());
        assert!(game.board().overlay().is_revealed(a));
        assert_eq!(game.settlements().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_hide_skips_cell_matched_elsewhere() {
        let game = session(2, 4);
        let mut alice = join(&game).await;
        let bob = join(&game).await;
        let (a, b) = pair(&game, 1);
        let (c, _) = pair(&game, 2);

        reveal(&alice, a).await;
        reveal(&alice, c).await;
        settle(10).await;
        reveal(&bob, a).await;
        reveal(&bob, b).await;
        settle(5_000).await;

        assert_eq!(hides(&drain(&mut alice.outbound)), vec![c]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_during_cooldown_hides_previous_pair() {
        let game = session(2, 4);
        let mut player = join(&game).await;
        let (a, _) = pair(&game, 1);
        let (c, _) = pair(&game, 2);
        let (e, _) = pair(&game, 3);

        reveal(&player, a).await;
        reveal(&player, c).await;
        reveal(&player, e).await;
        settle(10).await;

        let seen = drain(&mut player.outbound);
        let mut hidden = hides(&seen);
        hidden.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(hidden, expected);

        settle(5_000).await;
        assert_eq!(hides(&drain(&mut player.outbound)), vec![e]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_finishes_once() {
        let game = session(2, 2);
        let mut player = join(&game).await;

        for id in 1..=2 {
            let (a, b) = pair(&game, id);
            reveal(&player, a).await;
            reveal(&player, b).await;
        }
        settle(10).await;

        let finished: Vec<_> = drain(&mut player.outbound)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::GameFinished { .. }))
            .collect();
        assert_eq!(finished, vec![ServerMessage::GameFinished { pairs: 2 }]);
        assert!(game.is_finished());
        assert_eq!(game.settlements().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_and_leave_are_broadcast() {
        let game = session(2, 4);
        let mut alice = join(&game).await;
        let bob = join(&game).await;

        bob.actions.send(ClientMessage::HoverCard { row: 1, col: 2 }).await.unwrap();
        bob.actions.send(ClientMessage::LeaveCard { row: 1, col: 2 }).await.unwrap();
        settle(10).await;

        assert_eq!(
            drain(&mut alice.outbound),
            vec![
                ServerMessage::hover(Position::new(1, 2)),
                ServerMessage::leave(Position::new(1, 2)),
            ]
        );
        assert!(!game.board().overlay().is_revealed(Position::new(1, 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_actions() {
        let game = session(2, 4);
        let mut player = join(&game).await;

        player.actions.send(ClientMessage::Unknown).await.unwrap();
        player.actions.send(ClientMessage::RevealCard { row: 2, col: 0 }).await.unwrap();
        player.actions.send(ClientMessage::HoverCard { row: 0, col: 4 }).await.unwrap();
        player.actions.send(ClientMessage::Hello { name: "blob".into() }).await.unwrap();
        settle(5_000).await;

        assert!(drain(&mut player.outbound).is_empty());
        assert_eq!(
            game.registry().with_session(&player.id, |s| s.name().map(String::from)),
            Some(Some("blob".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_player_is_dropped() {
        let game = session(2, 4);
        let mut alice = join(&game).await;
        let bob = join(&game).await;
        let PlayerHandle { id: bob_id, outbound, task: bob_task, actions: bob_actions } = bob;
        drop(outbound);

        alice.actions.send(ClientMessage::HoverCard { row: 0, col: 0 }).await.unwrap();
        settle(10).await;

        assert!(!game.registry().contains(&bob_id));
        assert!(game.registry().contains(&alice.id));
        assert_eq!(drain(&mut alice.outbound), vec![ServerMessage::hover(Position::new(0, 0))]);

        // Bob's actor notices on its next action
        bob_actions.send(ClientMessage::Unknown).await.unwrap();
        bob_task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_reveal_inside_window_beats_firing_timer() {
        let game = session_with_timeout(2, 4, Duration::from_millis(100));
        let mut player = join(&game).await;
        let (a, b) = pair(&game, 2);

        reveal(&player, a).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Stall the actor on its own session lock past the deadline
        let holder = {
            let game = game.clone();
            let id = player.id;
            std::thread::spawn(move || {
                game.registry().with_session(&id, |_| std::thread::sleep(Duration::from_millis(300)));
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        player.actions.send(ClientMessage::Hello { name: "blob".into() }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Received well inside the window, processed after the timer fired
        reveal(&player, b).await;

        tokio::task::spawn_blocking(move || holder.join().unwrap()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let seen = drain(&mut player.outbound);
        assert_eq!(reveals(&seen), vec![a, b]);
        assert!(hides(&seen).is_empty());
        assert!(game.board().overlay().is_revealed(a));
        assert!(game.board().overlay().is_revealed(b));
        assert_eq!(game.settlements().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_received_after_deadline_does_not_pair() {
        let game = session(2, 4);
        let mut player = join(&game).await;
        let (a, b) = pair(&game, 2);

        reveal(&player, a).await;
        settle(10).await;
        let late = Instant::now() + TIMEOUT;
        player
            .actions
            .send_at(ClientMessage::RevealCard { row: b.row, col: b.col }, late)
            .await
            .unwrap();
        settle(10).await;

        let seen = drain(&mut player.outbound);
        assert_eq!(reveals(&seen), vec![a, b]);
        assert_eq!(hides(&seen), vec![a]);
        assert!(!game.board().overlay().is_revealed(b));
        assert!(game.settlements().is_empty());

        settle(5_000).await;
        assert_eq!(hides(&drain(&mut player.outbound)), vec![b]);
    }
}
