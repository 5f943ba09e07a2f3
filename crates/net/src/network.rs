use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lockstep_common::{Client, ClientId, Command, ConnectionState, Frame, LobbyInfo};
use lockstep_kernel::SyncReport;
use tracing::{debug, warn};

use crate::connection::{Connection, Inbound};
use crate::state::ConnectionTracker;
use crate::wire::{NetError, WireMessage};

/// Shared relay state: one encoded-message queue per participant.
#[derive(Debug)]
struct HubState {
    next_client: u32,
    lobby: LobbyInfo,
    queues: BTreeMap<ClientId, VecDeque<Vec<u8>>>,
}

fn lock(shared: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory relay connecting multiple [`NetworkConnection`]s.
///
/// Models the server path of a networked session: every batch is relayed to
/// every participant (sender included) so all peers consume one identical
/// stream. Messages cross the hub in their serialized wire form; transport
/// threads may feed the hub concurrently.
#[derive(Clone)]
pub struct RelayHub {
    shared: Arc<Mutex<HubState>>,
}

impl RelayHub {
    pub fn new(seed: u64) -> Self {
        Self {
            shared: Arc::new(Mutex::new(HubState {
                next_client: 0,
                lobby: LobbyInfo::new(seed),
                queues: BTreeMap::new(),
            })),
        }
    }

    /// Register a participant and hand back its connection.
    ///
    /// The first participant becomes the session admin. The connection
    /// starts `PreConnecting`; the handshake completes on its first poll.
    pub fn connect(&self, name: &str) -> Result<NetworkConnection, NetError> {
        let mut state = lock(&self.shared);
        let id = ClientId(state.next_client);
        state.next_client += 1;

        let mut client = Client::new(id, name);
        client.is_admin = state.lobby.clients.is_empty();
        state.lobby.clients.push(client);
        state.queues.insert(id, VecDeque::new());

        let welcome = WireMessage::Welcome {
            client: id,
            lobby: state.lobby.clone(),
        }
        .encode()?;
        let roster = WireMessage::Lobby(state.lobby.clone()).encode()?;

        for (peer, queue) in state.queues.iter_mut() {
            if *peer == id {
                queue.push_back(welcome.clone());
            } else {
                queue.push_back(roster.clone());
            }
        }

        debug!(%id, name, "participant registered with relay hub");
        Ok(NetworkConnection {
            client: id,
            tracker: ConnectionTracker::new(),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Simulate a transport failure: drop the participant's queue and tell
    /// everyone else. The participant observes the loss on its next poll.
    pub fn drop_client(&self, client: ClientId) -> Result<(), NetError> {
        let mut state = lock(&self.shared);
        if state.queues.remove(&client).is_none() {
            return Err(NetError::UnknownClient(client));
        }
        if let Some(entry) = state.lobby.client_mut(client) {
            entry.state = ConnectionState::NotConnected;
        }
        let msg = WireMessage::Drop { client }.encode()?;
        for queue in state.queues.values_mut() {
            queue.push_back(msg.clone());
        }
        Ok(())
    }

    /// Number of currently registered participants.
    pub fn client_count(&self) -> usize {
        lock(&self.shared).queues.len()
    }
}

/// A participant's end of the relay hub.
pub struct NetworkConnection {
    client: ClientId,
    tracker: ConnectionTracker,
    shared: Arc<Mutex<HubState>>,
}

impl NetworkConnection {
    fn broadcast(&self, bytes: Vec<u8>, include_self: bool) {
        let mut state = lock(&self.shared);
        for (peer, queue) in state.queues.iter_mut() {
            if include_self || *peer != self.client {
                queue.push_back(bytes.clone());
            }
        }
    }
}

impl Connection for NetworkConnection {
    fn local_client(&self) -> ClientId {
        self.client
    }

    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    fn send_batch(&mut self, frame: Frame, commands: Vec<Command>) {
        if self.tracker.state() != ConnectionState::Connected {
            warn!(client = %self.client, frame, "dropping batch sent while not connected");
            return;
        }
        match (WireMessage::Batch {
            client: self.client,
            frame,
            commands,
        })
        .encode()
        {
            Ok(bytes) => self.broadcast(bytes, true),
            Err(e) => warn!(client = %self.client, frame, error = %e, "failed to encode batch"),
        }
    }

    fn send_sync(&mut self, report: &SyncReport) {
        if self.tracker.state() != ConnectionState::Connected {
            return;
        }
        match (WireMessage::Sync {
            client: self.client,
            report: *report,
        })
        .encode()
        {
            Ok(bytes) => self.broadcast(bytes, false),
            Err(e) => warn!(client = %self.client, error = %e, "failed to encode sync report"),
        }
    }

    fn send_lobby(&mut self, lobby: &LobbyInfo) {
        if self.tracker.state() != ConnectionState::Connected {
            return;
        }
        lock(&self.shared).lobby = lobby.clone();
        match WireMessage::Lobby(lobby.clone()).encode() {
            Ok(bytes) => self.broadcast(bytes, true),
            Err(e) => warn!(client = %self.client, error = %e, "failed to encode lobby snapshot"),
        }
    }

    fn poll(&mut self, out: &mut Vec<Inbound>) {
        if self.tracker.state() == ConnectionState::NotConnected {
            return;
        }
        // The connect attempt is underway once we start polling.
        if self.tracker.state() == ConnectionState::PreConnecting {
            self.tracker.advance_to(ConnectionState::Connecting);
        }

        let drained: Vec<Vec<u8>> = {
            let mut state = lock(&self.shared);
            match state.queues.get_mut(&self.client) {
                Some(queue) => queue.drain(..).collect(),
                None => {
                    // The hub dropped us.
                    drop(state);
                    self.tracker.advance_to(ConnectionState::NotConnected);
                    out.push(Inbound::ClientDropped(self.client));
                    return;
                }
            }
        };

        for bytes in drained {
            match WireMessage::decode(&bytes) {
                Ok(WireMessage::Welcome { client, lobby }) => {
                    debug_assert_eq!(client, self.client);
                    self.tracker.advance_to(ConnectionState::Connected);
                    out.push(Inbound::Lobby(lobby));
                }
                Ok(WireMessage::Batch {
                    client,
                    frame,
                    commands,
                }) => out.push(Inbound::Batch {
                    client,
                    frame,
                    commands,
                }),
                Ok(WireMessage::Sync { client, report }) => {
                    out.push(Inbound::Sync { client, report })
                }
                Ok(WireMessage::Lobby(lobby)) => out.push(Inbound::Lobby(lobby)),
                Ok(WireMessage::Drop { client }) => out.push(Inbound::ClientDropped(client)),
                Err(e) => warn!(client = %self.client, error = %e, "dropping undecodable message"),
            }
        }
    }

    fn disconnect(&mut self) {
        if self.tracker.state() == ConnectionState::NotConnected {
            return;
        }
        {
            let mut state = lock(&self.shared);
            state.queues.remove(&self.client);
            if let Some(entry) = state.lobby.client_mut(self.client) {
                entry.state = ConnectionState::NotConnected;
            }
            match (WireMessage::Drop {
                client: self.client,
            })
            .encode()
            {
                Ok(bytes) => {
                    for queue in state.queues.values_mut() {
                        queue.push_back(bytes.clone());
                    }
                }
                Err(e) => warn!(client = %self.client, error = %e, "failed to encode drop notice"),
            }
        }
        self.tracker.advance_to(ConnectionState::NotConnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{span, Event, Level, Metadata};

    /// Counts warn-level events; everything else is filtered out.
    struct WarnCounter(Arc<AtomicUsize>);

    impl tracing::Subscriber for WarnCounter {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            *metadata.level() == Level::WARN
        }
        fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }
        fn record(&self, _: &span::Id, _: &span::Record<'_>) {}
        fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}
        fn event(&self, _: &Event<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn enter(&self, _: &span::Id) {}
        fn exit(&self, _: &span::Id) {}
    }

    fn connected(hub: &RelayHub, name: &str) -> NetworkConnection {
        let mut conn = hub.connect(name).unwrap();
        let mut out = Vec::new();
        conn.poll(&mut out);
        assert_eq!(conn.state(), ConnectionState::Connected);
        conn
    }

    #[test]
    fn handshake_reaches_connected() {
        let hub = RelayHub::new(42);
        let mut conn = hub.connect("host").unwrap();
        assert_eq!(conn.state(), ConnectionState::PreConnecting);

        let mut out = Vec::new();
        conn.poll(&mut out);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(matches!(out.as_slice(), [Inbound::Lobby(lobby)] if lobby.seed == 42));
    }

    #[test]
    fn first_participant_is_admin() {
        let hub = RelayHub::new(0);
        let mut host = hub.connect("host").unwrap();
        let mut out = Vec::new();
        host.poll(&mut out);
        let Some(Inbound::Lobby(lobby)) = out.first() else {
            panic!("expected lobby snapshot");
        };
        assert!(lobby.client(ClientId(0)).unwrap().is_admin);
    }

    #[test]
    fn steady_state_polls_do_not_warn() {
        let hub = RelayHub::new(0);
        let mut conn = connected(&hub, "solo");

        let warns = Arc::new(AtomicUsize::new(0));
        tracing::subscriber::with_default(WarnCounter(Arc::clone(&warns)), || {
            let mut out = Vec::new();
            for _ in 0..10 {
                conn.poll(&mut out);
            }
            assert!(out.is_empty());
        });

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(warns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lobby_snapshot_reaches_all_peers_and_later_joiners() {
        let hub = RelayHub::new(7);
        let mut a = connected(&hub, "a");
        let mut b = connected(&hub, "b");

        let mut lobby = LobbyInfo::new(7);
        lobby.clients.push(Client::new(ClientId(0), "a"));
        let mut guest = Client::new(ClientId(1), "b");
        guest.team = 2;
        lobby.clients.push(guest);
        a.send_lobby(&lobby);

        for conn in [&mut a, &mut b] {
            let mut out = Vec::new();
            conn.poll(&mut out);
            assert!(
                out.iter().any(|m| matches!(
                    m,
                    Inbound::Lobby(l) if l.client(ClientId(1)).unwrap().team == 2
                )),
                "snapshot missing on {}",
                conn.local_client()
            );
        }

        // The hub keeps the snapshot, so a later joiner is welcomed with it.
        let mut c = hub.connect("c").unwrap();
        let mut out = Vec::new();
        c.poll(&mut out);
        assert!(out.iter().any(|m| matches!(
            m,
            Inbound::Lobby(l) if l.client(ClientId(1)).unwrap().team == 2
        )));
    }

    #[test]
    fn batches_relay_to_all_including_sender() {
        let hub = RelayHub::new(0);
        let mut a = connected(&hub, "a");
        let mut b = connected(&hub, "b");

        a.send_batch(1, vec![Command::noop(a.local_client(), 1)]);

        for conn in [&mut a, &mut b] {
            let mut out = Vec::new();
            conn.poll(&mut out);
            assert!(
                out.iter().any(|m| matches!(
                    m,
                    Inbound::Batch { client, frame: 1, .. } if *client == ClientId(0)
                )),
                "batch missing on {}",
                conn.local_client()
            );
        }
    }

    #[test]
    fn sync_reports_skip_the_sender() {
        let hub = RelayHub::new(0);
        let mut a = connected(&hub, "a");
        let mut b = connected(&hub, "b");

        let report = SyncReport {
            frame: 3,
            hash: 0xdead,
            shared_random_calls: 7,
        };
        a.send_sync(&report);

        let mut out = Vec::new();
        a.poll(&mut out);
        assert!(!out.iter().any(|m| matches!(m, Inbound::Sync { .. })));

        out.clear();
        b.poll(&mut out);
        assert!(out.iter().any(
            |m| matches!(m, Inbound::Sync { client, report: r } if *client == ClientId(0) && *r == report)
        ));
    }

    #[test]
    fn hub_drop_reaches_both_sides() {
        let hub = RelayHub::new(0);
        let mut a = connected(&hub, "a");
        let mut b = connected(&hub, "b");

        hub.drop_client(b.local_client()).unwrap();

        let mut out = Vec::new();
        a.poll(&mut out);
        assert!(out.contains(&Inbound::ClientDropped(ClientId(1))));

        out.clear();
        b.poll(&mut out);
        assert_eq!(b.state(), ConnectionState::NotConnected);
        assert!(out.contains(&Inbound::ClientDropped(ClientId(1))));
    }

    #[test]
    fn disconnect_notifies_peers() {
        let hub = RelayHub::new(0);
        let mut a = connected(&hub, "a");
        let mut b = connected(&hub, "b");

        b.disconnect();
        assert_eq!(b.state(), ConnectionState::NotConnected);
        assert_eq!(hub.client_count(), 1);

        let mut out = Vec::new();
        a.poll(&mut out);
        assert!(out.contains(&Inbound::ClientDropped(ClientId(1))));
    }

    #[test]
    fn dropping_unknown_client_is_an_error() {
        let hub = RelayHub::new(0);
        assert!(matches!(
            hub.drop_client(ClientId(9)),
            Err(NetError::UnknownClient(ClientId(9)))
        ));
    }

    #[test]
    fn concurrent_sends_are_serialized() {
        let hub = RelayHub::new(0);
        let mut observer = connected(&hub, "observer");
        let senders: Vec<_> = (0..4).map(|i| connected(&hub, &format!("s{i}"))).collect();

        let handles: Vec<_> = senders
            .into_iter()
            .map(|mut conn| {
                std::thread::spawn(move || {
                    for frame in 1..=50u64 {
                        conn.send_batch(frame, vec![Command::noop(conn.local_client(), frame)]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut out = Vec::new();
        observer.poll(&mut out);
        let batches = out
            .iter()
            .filter(|m| matches!(m, Inbound::Batch { .. }))
            .count();
        assert_eq!(batches, 4 * 50);
    }
}
