use std::collections::BTreeMap;

use lockstep_common::{ClientId, Command, ConnectionState, Frame, LobbyInfo};
use lockstep_kernel::{SyncGuard, SyncReport, World};
use lockstep_net::{Connection, Inbound};
use lockstep_replay::{ReplayError, ReplayRecord, ReplayWriter};
use tracing::{debug, info_span, warn};

use crate::frame_buffer::FrameBuffer;
use crate::transport::Transport;

/// How many committed frames keep their sync report around for peer
/// cross-checking.
const REPORT_WINDOW: usize = 128;

/// Errors from the order manager.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("cannot attach a transport while a frame commit is in progress")]
    AttachWhileCommitting,
    #[error("local participant is not connected")]
    Disconnected,
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Notifications surfaced to the surrounding application, queued in
/// occurrence order and drained once per iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A frame committed; the report carries its number and digest.
    FrameCommitted { report: SyncReport },
    /// A peer's report for a committed frame disagrees with ours.
    Desync {
        client: ClientId,
        local: SyncReport,
        remote: SyncReport,
    },
    ConnectionChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    LobbyChanged(LobbyInfo),
    ClientDropped(ClientId),
}

/// Owns the commit path: the frame buffer, the transport, the sync guard,
/// and the world being advanced.
///
/// Nothing else may mutate the world once attached here. Commits are never
/// skipped or speculated; if the next frame is not ready the manager simply
/// reports no progress and the scheduler retries next iteration.
pub struct OrderManager<W: World> {
    world: W,
    guard: SyncGuard,
    cosmetic_seed: u64,
    transport: Transport,
    buffer: FrameBuffer,
    lobby: LobbyInfo,
    started: bool,
    committing: bool,
    last_state: ConnectionState,
    /// Payloads issued locally, waiting to be tagged with a frame and sent.
    outgoing: Vec<Vec<u8>>,
    /// Highest frame our local batch has been sent for.
    last_sent: Frame,
    local_reports: BTreeMap<Frame, SyncReport>,
    /// Peer reports that arrived before we committed their frame.
    peer_reports: BTreeMap<Frame, Vec<(ClientId, SyncReport)>>,
    events: Vec<EngineEvent>,
    recorder: Option<ReplayWriter>,
}

impl<W: World> OrderManager<W> {
    /// `lobby` seeds the shared generator and the expected roster; network
    /// sessions may refine both through lobby snapshots until the first
    /// frame commits. `cosmetic_seed` is local and may be anything.
    pub fn new(world: W, transport: Transport, lobby: LobbyInfo, cosmetic_seed: u64) -> Self {
        let buffer = FrameBuffer::new();
        buffer.set_expected(lobby.active_clients().map(|c| c.index));
        let last_state = transport.state();
        Self {
            world,
            guard: SyncGuard::new(lobby.seed, cosmetic_seed),
            cosmetic_seed,
            transport,
            buffer,
            lobby,
            started: false,
            committing: false,
            last_state,
            outgoing: Vec::new(),
            last_sent: 0,
            local_reports: BTreeMap::new(),
            peer_reports: BTreeMap::new(),
            events: Vec::new(),
            recorder: None,
        }
    }

    /// Record every committed frame to `writer`. Each record is flushed on
    /// commit, so the file is readable up to the last committed frame even
    /// after an abrupt shutdown.
    pub fn record_to(&mut self, writer: ReplayWriter) {
        self.recorder = Some(writer);
    }

    /// Bind a new command source, releasing the previous one.
    ///
    /// Only the transport is swapped. The world stays attached for the
    /// manager's whole lifetime: committed state carries over, and the
    /// world is released together with the transport in [`dispose`].
    ///
    /// [`dispose`]: OrderManager::dispose
    pub fn attach(&mut self, transport: Transport) -> Result<(), OrderError> {
        if self.committing {
            return Err(OrderError::AttachWhileCommitting);
        }
        let mut old = std::mem::replace(&mut self.transport, transport);
        old.disconnect();
        self.last_state = self.transport.state();
        Ok(())
    }

    /// Queue a command payload for the local participant.
    ///
    /// While the transport is still connecting the payload is buffered and
    /// sent with the first batch after the transition to Connected.
    pub fn issue(&mut self, payload: Vec<u8>) -> Result<(), OrderError> {
        if self.transport.state() == ConnectionState::NotConnected {
            return Err(OrderError::Disconnected);
        }
        self.outgoing.push(payload);
        Ok(())
    }

    /// Mutate the session roster and broadcast the snapshot whole.
    ///
    /// The snapshot is not applied directly: it arrives back through the
    /// transport like any peer's, so every participant adopts roster
    /// changes through the same single path.
    pub fn update_lobby(&mut self, mutate: impl FnOnce(&mut LobbyInfo)) {
        let mut lobby = self.lobby.clone();
        mutate(&mut lobby);
        self.transport.send_lobby(&lobby);
    }

    /// Mark the simulation as running. Idempotent; separates lobby setup
    /// from active play.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            debug!(client = %self.transport.local_client(), "simulation started");
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Last committed frame number; 0 before the first commit.
    pub fn current_frame(&self) -> Frame {
        self.buffer.next_frame() - 1
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn local_client(&self) -> ClientId {
        self.transport.local_client()
    }

    pub fn lobby(&self) -> &LobbyInfo {
        &self.lobby
    }

    /// Read-only view of committed simulation state.
    pub fn world(&self) -> &W {
        &self.world
    }

    /// The error that ended replay playback early, if any.
    pub fn take_replay_error(&mut self) -> Option<ReplayError> {
        self.transport.take_replay_error()
    }

    /// Queued events in occurrence order. Call once per iteration.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Send the local batch for the next frame if not yet sent, drain
    /// inbound traffic, and diff the connection state. Call once per
    /// iteration and again after each commit.
    ///
    /// Sending happens before polling so the local echo of a batch is
    /// picked up within the same call.
    pub fn pump_transport(&mut self) {
        if self.started && self.transport.state() == ConnectionState::Connected {
            let frame = self.buffer.next_frame();
            if self.last_sent < frame {
                let issuer = self.transport.local_client();
                let commands: Vec<Command> = self
                    .outgoing
                    .drain(..)
                    .map(|payload| Command::new(issuer, frame, payload))
                    .collect();
                self.transport.send_batch(frame, commands);
                self.last_sent = frame;
            }
        }

        let mut inbound = Vec::new();
        self.transport.poll(&mut inbound);
        for message in inbound {
            self.route(message);
        }

        let state = self.transport.state();
        if state != self.last_state {
            self.events.push(EngineEvent::ConnectionChanged {
                from: self.last_state,
                to: state,
            });
            self.last_state = state;
        }
    }

    /// Commit the next frame if the buffer reports it ready. Returns
    /// whether a commit occurred; never blocks.
    pub fn try_advance_one_frame(&mut self) -> bool {
        if !self.started {
            return false;
        }
        let Some((frame, commands)) = self.buffer.take_next() else {
            return false;
        };
        self.committing = true;
        let span = info_span!("commit", frame);
        let _enter = span.enter();

        if let Some(recorder) = &mut self.recorder {
            let record = ReplayRecord {
                frame,
                commands: commands.clone(),
            };
            if let Err(e) = recorder.append(&record) {
                warn!(error = %e, "replay recording failed, stopping recorder");
                self.recorder = None;
            }
        }

        let Self { guard, world, .. } = self;
        guard.run_synced(|shared| world.advance(frame, &commands, shared));
        let report = guard.checksum(frame, world);

        self.transport.send_sync(&report);
        self.local_reports.insert(frame, report);
        while self.local_reports.len() > REPORT_WINDOW {
            self.local_reports.pop_first();
        }
        if let Some(peers) = self.peer_reports.remove(&frame) {
            for (client, remote) in peers {
                self.check_pair(client, report, remote);
            }
        }

        self.events.push(EngineEvent::FrameCommitted { report });
        self.committing = false;
        true
    }

    /// Finalize the replay log and release the transport.
    pub fn dispose(mut self) -> Result<(), OrderError> {
        if let Some(recorder) = self.recorder.take() {
            recorder.finalize()?;
        }
        self.transport.disconnect();
        Ok(())
    }

    fn route(&mut self, message: Inbound) {
        match message {
            Inbound::Batch {
                client,
                frame,
                commands,
            } => {
                // Stale batches are already counted and logged by the
                // buffer.
                let _ = self.buffer.submit(client, frame, commands);
            }
            Inbound::Sync { client, report } => self.cross_check(client, report),
            Inbound::Lobby(lobby) => self.adopt_lobby(lobby),
            Inbound::ClientDropped(client) => {
                self.buffer.mark_absent(client);
                if let Some(entry) = self.lobby.client_mut(client) {
                    entry.state = ConnectionState::NotConnected;
                }
                self.events.push(EngineEvent::ClientDropped(client));
            }
        }
    }

    /// Apply a lobby snapshot atomically by whole-value replacement.
    fn adopt_lobby(&mut self, lobby: LobbyInfo) {
        if self.buffer.next_frame() == 1 && lobby.seed != self.guard.shared_seed() {
            // The authoritative seed arrives with the first snapshot;
            // reseeding is only legal before anything has committed.
            debug!(seed = lobby.seed, "adopting shared seed from lobby");
            self.guard = SyncGuard::new(lobby.seed, self.cosmetic_seed);
        }
        self.buffer
            .set_expected(lobby.active_clients().map(|c| c.index));
        self.lobby = lobby.clone();
        self.events.push(EngineEvent::LobbyChanged(lobby));
    }

    fn cross_check(&mut self, client: ClientId, remote: SyncReport) {
        match self.local_reports.get(&remote.frame) {
            Some(local) => {
                let local = *local;
                self.check_pair(client, local, remote);
            }
            None if remote.frame >= self.buffer.next_frame() => {
                // Peer is ahead of us; hold the report until we commit.
                self.peer_reports
                    .entry(remote.frame)
                    .or_default()
                    .push((client, remote));
            }
            None => {
                debug!(%client, frame = remote.frame, "peer report for a pruned frame, ignoring")
            }
        }
    }

    fn check_pair(&mut self, client: ClientId, local: SyncReport, remote: SyncReport) {
        if local != remote {
            warn!(
                %client,
                frame = local.frame,
                local_hash = local.hash,
                remote_hash = remote.hash,
                "desync detected"
            );
            self.events.push(EngineEvent::Desync {
                client,
                local,
                remote,
            });
        }
    }
}
