use lockstep_common::{ClientId, Command, ConnectionState, Frame, LobbyInfo};
use lockstep_kernel::SyncReport;
use lockstep_net::{Connection, Inbound, LocalConnection, NetworkConnection};
use lockstep_replay::{ReplayConnection, ReplayError};

/// The known command sources, selected by explicit configuration.
pub enum Transport {
    /// Live multi-peer session through a relay hub.
    Network(NetworkConnection),
    /// Single-participant in-process echo.
    Local(LocalConnection),
    /// Recorded session played back from file.
    Replay(ReplayConnection),
}

impl Transport {
    fn as_connection(&mut self) -> &mut dyn Connection {
        match self {
            Transport::Network(c) => c,
            Transport::Local(c) => c,
            Transport::Replay(c) => c,
        }
    }

    /// For replay transports, the error that ended playback early.
    pub fn take_replay_error(&mut self) -> Option<ReplayError> {
        match self {
            Transport::Replay(c) => c.take_error(),
            _ => None,
        }
    }
}

impl Connection for Transport {
    fn local_client(&self) -> ClientId {
        match self {
            Transport::Network(c) => c.local_client(),
            Transport::Local(c) => c.local_client(),
            Transport::Replay(c) => c.local_client(),
        }
    }

    fn state(&self) -> ConnectionState {
        match self {
            Transport::Network(c) => c.state(),
            Transport::Local(c) => c.state(),
            Transport::Replay(c) => c.state(),
        }
    }

    fn send_batch(&mut self, frame: Frame, commands: Vec<Command>) {
        self.as_connection().send_batch(frame, commands);
    }

    fn send_sync(&mut self, report: &SyncReport) {
        self.as_connection().send_sync(report);
    }

    fn send_lobby(&mut self, lobby: &LobbyInfo) {
        self.as_connection().send_lobby(lobby);
    }

    fn poll(&mut self, out: &mut Vec<Inbound>) {
        self.as_connection().poll(out);
    }

    fn disconnect(&mut self) {
        self.as_connection().disconnect();
    }
}

impl From<NetworkConnection> for Transport {
    fn from(c: NetworkConnection) -> Self {
        Transport::Network(c)
    }
}

impl From<LocalConnection> for Transport {
    fn from(c: LocalConnection) -> Self {
        Transport::Local(c)
    }
}

impl From<ReplayConnection> for Transport {
    fn from(c: ReplayConnection) -> Self {
        Transport::Replay(c)
    }
}
