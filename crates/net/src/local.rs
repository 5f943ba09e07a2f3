use std::collections::VecDeque;

use lockstep_common::{ClientId, Command, ConnectionState, Frame, LobbyInfo};
use lockstep_kernel::SyncReport;
use tracing::debug;

use crate::connection::{Connection, Inbound};
use crate::state::ConnectionTracker;

/// In-process echo connection for single-player and offline sessions.
///
/// Batches are looped straight back to the sender, so the commit path is
/// identical to a networked session with one participant. Connected from
/// creation; there is no handshake to perform.
pub struct LocalConnection {
    client: ClientId,
    tracker: ConnectionTracker,
    queue: VecDeque<Inbound>,
}

impl LocalConnection {
    pub fn new(client: ClientId) -> Self {
        debug!(%client, "local connection ready");
        Self {
            client,
            tracker: ConnectionTracker::with_state(ConnectionState::Connected),
            queue: VecDeque::new(),
        }
    }
}

impl Connection for LocalConnection {
    fn local_client(&self) -> ClientId {
        self.client
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    fn send_batch(&mut self, frame: Frame, commands: Vec<Command>) {
        if self.tracker.state() != ConnectionState::Connected {
            return;
        }
        self.queue.push_back(Inbound::Batch {
            client: self.client,
            frame,
            commands,
        });
    }

    fn send_sync(&mut self, _report: &SyncReport) {
        // No peers to cross-check against.
    }

    fn send_lobby(&mut self, lobby: &LobbyInfo) {
        if self.tracker.state() != ConnectionState::Connected {
            return;
        }
        // Echoed back so lobby mutations take the same path as networked
        // sessions.
        self.queue.push_back(Inbound::Lobby(lobby.clone()));
    }

    fn poll(&mut self, out: &mut Vec<Inbound>) {
        out.extend(self.queue.drain(..));
    }

    fn disconnect(&mut self) {
        self.tracker.advance_to(ConnectionState::NotConnected);
        self.queue.clear();
    }
}
