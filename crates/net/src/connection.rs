use lockstep_common::{ClientId, Command, ConnectionState, Frame, LobbyInfo};
use lockstep_kernel::SyncReport;

/// Inbound traffic delivered by a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A participant's command batch for one frame. Commands keep their
    /// individual frame targeting even when transports batch several into
    /// one message.
    Batch {
        client: ClientId,
        frame: Frame,
        commands: Vec<Command>,
    },
    /// A peer's sync report, delivered out-of-band from command data.
    Sync {
        client: ClientId,
        report: SyncReport,
    },
    /// A full session snapshot; receivers apply it atomically by
    /// replacement.
    Lobby(LobbyInfo),
    /// A participant left or was lost by the transport.
    ClientDropped(ClientId),
}

/// A source of frame-tagged command batches.
///
/// All methods are non-blocking: waiting is expressed as "`poll` delivered
/// nothing, try again next scheduler iteration". Implementations may be fed
/// from other threads but are polled from the tick thread only.
pub trait Connection: Send {
    /// The participant id this connection speaks for.
    fn local_client(&self) -> ClientId;

    /// Current lifecycle state, readable every iteration.
    fn state(&self) -> ConnectionState;

    /// Queue the local participant's batch for `frame`. The batch comes
    /// back through `poll` like any peer's, so every participant sees one
    /// identical stream.
    fn send_batch(&mut self, frame: Frame, commands: Vec<Command>);

    /// Broadcast the local sync report for cross-checking.
    fn send_sync(&mut self, report: &SyncReport);

    /// Broadcast a session snapshot to all participants.
    fn send_lobby(&mut self, lobby: &LobbyInfo);

    /// Drain all pending inbound traffic into `out`, driving lifecycle
    /// transitions as a side effect.
    fn poll(&mut self, out: &mut Vec<Inbound>);

    /// Leave the session. Moves the connection to `NotConnected`.
    fn disconnect(&mut self);
}
