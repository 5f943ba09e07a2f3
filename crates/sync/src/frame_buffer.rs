use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lockstep_common::{ClientId, Command, Frame};
use tracing::{debug, warn};

/// Errors from frame buffer submissions.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("batch for frame {frame} is stale, next commit is frame {next_commit}")]
    Stale { frame: Frame, next_commit: Frame },
}

#[derive(Debug, Default)]
struct Inner {
    /// Participants that must submit before a frame is ready.
    expected: BTreeSet<ClientId>,
    /// Per-frame, per-participant batches awaiting commit. Both maps are
    /// ordered so commit order is deterministic.
    pending: BTreeMap<Frame, BTreeMap<ClientId, Vec<Command>>>,
    next_commit: Frame,
    stale_rejected: u64,
}

/// The lockstep barrier.
///
/// Collects command batches per frame and per participant. A frame is ready
/// when every expected participant has an entry for it (an empty batch
/// counts; it is an explicit "nothing this frame"). Frames leave the buffer
/// in strict ascending order only.
///
/// Transport threads may submit concurrently; everything funnels through one
/// mutex so arrival sequence is well defined.
#[derive(Debug)]
pub struct FrameBuffer {
    inner: Mutex<Inner>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_commit: 1,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the set of participants expected to submit each frame.
    pub fn set_expected(&self, clients: impl IntoIterator<Item = ClientId>) {
        let mut inner = self.lock();
        inner.expected = clients.into_iter().collect();
        debug!(expected = inner.expected.len(), "frame buffer roster updated");
    }

    /// Record a participant's batch for `frame`.
    ///
    /// An empty `commands` list registers participation without contributing
    /// commands. A second submission for the same frame appends, preserving
    /// arrival order within the issuer.
    pub fn submit(
        &self,
        client: ClientId,
        frame: Frame,
        commands: Vec<Command>,
    ) -> Result<(), BufferError> {
        let mut inner = self.lock();
        if frame < inner.next_commit {
            inner.stale_rejected += 1;
            warn!(%client, frame, next_commit = inner.next_commit, "rejecting stale batch");
            return Err(BufferError::Stale {
                frame,
                next_commit: inner.next_commit,
            });
        }
        inner
            .pending
            .entry(frame)
            .or_default()
            .entry(client)
            .or_default()
            .extend(commands);
        Ok(())
    }

    /// Remove a participant from the expected set and synthesize explicit
    /// empty batches for every frame still pending, so nothing waits forever
    /// on input that will never arrive.
    pub fn mark_absent(&self, client: ClientId) {
        let mut inner = self.lock();
        if !inner.expected.remove(&client) {
            return;
        }
        let horizon = inner.next_commit;
        for (_, batches) in inner.pending.range_mut(horizon..) {
            batches.entry(client).or_default();
        }
        debug!(%client, "participant marked absent");
    }

    /// Whether the next frame in order can commit.
    pub fn ready(&self) -> bool {
        let inner = self.lock();
        if inner.expected.is_empty() {
            return false;
        }
        match inner.pending.get(&inner.next_commit) {
            Some(batches) => inner.expected.iter().all(|c| batches.contains_key(c)),
            None => false,
        }
    }

    /// Remove and return the next frame if it is ready.
    ///
    /// Commands are flattened into the total order: participant id first,
    /// arrival sequence within each participant second.
    pub fn take_next(&self) -> Option<(Frame, Vec<Command>)> {
        if !self.ready() {
            return None;
        }
        let mut inner = self.lock();
        let frame = inner.next_commit;
        let batches = inner.pending.remove(&frame)?;
        inner.next_commit += 1;
        let commands = batches.into_values().flatten().collect();
        Some((frame, commands))
    }

    /// The frame number the next commit will carry. One greater than the
    /// last committed frame; starts at 1.
    pub fn next_frame(&self) -> Frame {
        self.lock().next_commit
    }

    /// How many stale batches have been rejected so far.
    pub fn stale_rejected(&self) -> u64 {
        self.lock().stale_rejected
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
