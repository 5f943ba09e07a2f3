use std::collections::BTreeMap;
use std::path::Path;

use lockstep_common::{ClientId, Command, ConnectionState, Frame, LobbyInfo};
use lockstep_kernel::SyncReport;
use lockstep_net::{Connection, ConnectionTracker, Inbound};
use tracing::warn;

use crate::format::ReplayError;
use crate::reader::ReplayReader;

/// Participant id used for the spectator driving a replay. Never collides
/// with recorded ids, which are assigned from zero upwards.
pub const SPECTATOR: ClientId = ClientId(u32::MAX);

/// Plays a replay file back through the live commit path.
///
/// Each poll delivers one recorded frame as a batch per rostered
/// participant, so the frame buffer reaches readiness exactly as it did
/// during recording. The connection is `Connected` while records remain and
/// drops to `NotConnected` at end of file; it never re-enters a connecting
/// state. Outbound traffic is discarded.
pub struct ReplayConnection {
    reader: ReplayReader,
    roster: Vec<ClientId>,
    lobby: Option<LobbyInfo>,
    tracker: ConnectionTracker,
    error: Option<ReplayError>,
}

impl ReplayConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let reader = ReplayReader::open(path)?;
        let header = reader.header();
        let roster = header.clients.iter().map(|c| c.index).collect();
        let lobby = LobbyInfo {
            seed: header.seed,
            clients: header.clients.clone(),
        };
        Ok(Self {
            reader,
            roster,
            lobby: Some(lobby),
            tracker: ConnectionTracker::with_state(ConnectionState::Connected),
            error: None,
        })
    }

    /// Seed the recorded session started from.
    pub fn seed(&self) -> u64 {
        self.reader.header().seed
    }

    /// The error that ended playback, if it did not end at a clean end of
    /// file.
    pub fn take_error(&mut self) -> Option<ReplayError> {
        self.error.take()
    }

    fn deliver(&mut self, frame: Frame, commands: Vec<Command>, out: &mut Vec<Inbound>) {
        let mut by_issuer: BTreeMap<ClientId, Vec<Command>> = BTreeMap::new();
        for client in &self.roster {
            by_issuer.insert(*client, Vec::new());
        }
        for command in commands {
            by_issuer.entry(command.issuer).or_default().push(command);
        }
        for (client, commands) in by_issuer {
            out.push(Inbound::Batch {
                client,
                frame,
                commands,
            });
        }
    }
}

impl Connection for ReplayConnection {
    fn local_client(&self) -> ClientId {
        SPECTATOR
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    fn send_batch(&mut self, _frame: Frame, _commands: Vec<Command>) {
        // Spectators have no say in a recorded session.
    }

    fn send_sync(&mut self, _report: &SyncReport) {}

    fn send_lobby(&mut self, _lobby: &LobbyInfo) {}

    fn poll(&mut self, out: &mut Vec<Inbound>) {
        if self.tracker.state() != ConnectionState::Connected {
            return;
        }
        if let Some(lobby) = self.lobby.take() {
            out.push(Inbound::Lobby(lobby));
        }
        match self.reader.next_record() {
            Ok(Some(record)) => self.deliver(record.frame, record.commands, out),
            Ok(None) => {
                self.tracker.advance_to(ConnectionState::NotConnected);
            }
            Err(e) => {
                warn!(error = %e, "replay playback aborted");
                self.error = Some(e);
                self.tracker.advance_to(ConnectionState::NotConnected);
            }
        }
    }

    fn disconnect(&mut self) {
        self.tracker.advance_to(ConnectionState::NotConnected);
    }
}
