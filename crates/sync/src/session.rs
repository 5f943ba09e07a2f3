use std::sync::Arc;
use std::time::{Duration, Instant};

use lockstep_kernel::World;

use crate::actions::ActionQueue;
use crate::manager::{EngineEvent, OrderManager};
use crate::scheduler::{Cadence, SchedulerConfig, TickScheduler};

/// What one pump iteration produced.
#[derive(Debug)]
pub struct PumpOutcome {
    pub frames_committed: u32,
    /// Whether the presentation layer should tick now. Independent of
    /// simulation progress.
    pub render_due: bool,
    pub events: Vec<EngineEvent>,
}

/// One session: the order manager plus its clocks and deferred-action
/// queue, driven by a single `pump` call per main-loop iteration.
///
/// Iteration order is fixed: drain the transport, commit every due and
/// ready frame (draining deferred actions after each), then check the
/// render cadence and hand back queued events.
pub struct Session<W: World> {
    manager: OrderManager<W>,
    scheduler: TickScheduler,
    render: Cadence,
    actions: Arc<ActionQueue>,
}

impl<W: World> Session<W> {
    pub fn new(
        manager: OrderManager<W>,
        config: SchedulerConfig,
        render_interval: Duration,
    ) -> Self {
        Self {
            manager,
            scheduler: TickScheduler::new(config),
            render: Cadence::new(render_interval),
            actions: Arc::new(ActionQueue::new()),
        }
    }

    pub fn manager(&self) -> &OrderManager<W> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut OrderManager<W> {
        &mut self.manager
    }

    /// Handle for scheduling deferred actions, shareable across threads.
    pub fn actions(&self) -> Arc<ActionQueue> {
        Arc::clone(&self.actions)
    }

    /// Release the session's clocks and recover the manager, typically to
    /// call `dispose` on it.
    pub fn into_manager(self) -> OrderManager<W> {
        self.manager
    }

    /// Run one main-loop iteration at wall-clock time `now`.
    pub fn pump(&mut self, now: Instant) -> PumpOutcome {
        self.manager.pump_transport();
        self.scheduler.update(now);

        let mut frames_committed = 0;
        while self.scheduler.due() {
            if !self.manager.try_advance_one_frame() {
                // Waiting on peers. Debt stays and is clamped by the jank
                // threshold on the next update.
                break;
            }
            self.scheduler.consume();
            frames_committed += 1;
            self.actions.run_due(self.manager.current_frame());
            // Send the next frame's batch and pick up echoes so several
            // frames can commit within one iteration.
            self.manager.pump_transport();
        }

        PumpOutcome {
            frames_committed,
            render_due: self.render.due(now),
            events: self.manager.drain_events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use lockstep_common::{Client, ClientId, LobbyInfo};
    use lockstep_kernel::{DemoCommand, DemoWorld, SyncReport};
    use lockstep_net::LocalConnection;
    use lockstep_replay::{ReplayConnection, ReplayHeader, ReplayWriter};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn local_lobby(seed: u64) -> LobbyInfo {
        let mut lobby = LobbyInfo::new(seed);
        lobby.clients.push(Client::new(ClientId(0), "player"));
        lobby
    }

    fn local_session(seed: u64) -> Session<DemoWorld> {
        let manager = OrderManager::new(
            DemoWorld::new(),
            Transport::Local(LocalConnection::new(ClientId(0))),
            local_lobby(seed),
            7,
        );
        Session::new(manager, SchedulerConfig::default(), Duration::from_millis(16))
    }

    fn committed_reports(events: &[EngineEvent]) -> Vec<SyncReport> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::FrameCommitted { report } => Some(*report),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn pump_commits_frames_as_time_passes() {
        let mut session = local_session(1);
        session.manager_mut().start();
        let config = SchedulerConfig::default();
        let start = Instant::now();

        let outcome = session.pump(start);
        assert_eq!(outcome.frames_committed, 0);

        let outcome = session.pump(start + config.timestep * 3);
        assert_eq!(outcome.frames_committed, 3);
        assert_eq!(session.manager().current_frame(), 3);
        assert_eq!(
            committed_reports(&outcome.events)
                .iter()
                .map(|r| r.frame)
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn stall_is_bounded_by_jank_threshold() {
        let mut session = local_session(1);
        session.manager_mut().start();
        let config = SchedulerConfig::default();
        let start = Instant::now();

        session.pump(start);
        let outcome = session.pump(start + Duration::from_secs(30));
        // 250ms of debt at 40ms per frame.
        assert_eq!(outcome.frames_committed, 6);
    }

    #[test]
    fn render_cadence_fires_even_when_simulation_stalls() {
        let mut session = local_session(1);
        // Never started, so no frame ever commits.
        let start = Instant::now();
        let outcome = session.pump(start);
        assert_eq!(outcome.frames_committed, 0);
        assert!(outcome.render_due);
    }

    #[test]
    fn deferred_actions_run_after_their_tick_commits() {
        let mut session = local_session(1);
        session.manager_mut().start();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        session.actions().schedule(2, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let start = Instant::now();
        let config = SchedulerConfig::default();
        session.pump(start);
        session.pump(start + config.timestep);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "tick 2 not reached yet");

        session.pump(start + config.timestep * 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recorded_session_replays_to_identical_digests() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.replay");
        let lobby = local_lobby(42);

        // Live run: spawn, move, scatter across a few frames, recording.
        let mut session = local_session(42);
        session.manager_mut().record_to(
            ReplayWriter::create(&path, &ReplayHeader::new(42, "0.1.0", lobby.clients.clone()))
                .unwrap(),
        );
        session.manager_mut().start();

        let config = SchedulerConfig::default();
        let start = Instant::now();
        session.pump(start);
        let mut live = Vec::new();
        let scripted = [
            Some(DemoCommand::Spawn { x: 1, y: 2 }),
            Some(DemoCommand::Spawn { x: -3, y: 0 }),
            Some(DemoCommand::Scatter { range: 4 }),
            None,
            Some(DemoCommand::Move {
                unit: 0,
                dx: 2,
                dy: -1,
            }),
        ];
        for (i, step) in scripted.iter().enumerate() {
            if let Some(command) = step {
                session
                    .manager_mut()
                    .issue(command.encode().unwrap())
                    .unwrap();
            }
            let outcome = session.pump(start + config.timestep * (i as u32 + 1));
            live.extend(committed_reports(&outcome.events));
        }
        assert_eq!(live.len(), scripted.len());
        session.into_manager().dispose().unwrap();

        // Replay run: same digests, frame for frame.
        let conn = ReplayConnection::open(&path).unwrap();
        let mut manager = OrderManager::new(
            DemoWorld::new(),
            Transport::Replay(conn),
            LobbyInfo::new(42),
            999, // different cosmetic seed on purpose
        );
        manager.start();
        let mut replayed = Vec::new();
        for _ in 0..scripted.len() + 2 {
            manager.pump_transport();
            manager.try_advance_one_frame();
            replayed.extend(committed_reports(&manager.drain_events()));
        }
        assert!(manager.take_replay_error().is_none());
        assert_eq!(live, replayed);
    }
}
