use std::time::{Duration, Instant};

use tracing::trace;

/// Tick timing configuration. No ambient globals; construct and pass in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Wall-clock duration of one simulation frame.
    pub timestep: Duration,
    /// Maximum wall-clock debt carried across iterations. Anything beyond
    /// this is discarded rather than fast-forwarded through, so a debugger
    /// pause or OS stall does not trigger a catch-up spiral.
    pub jank_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timestep: Duration::from_millis(40),
            jank_threshold: Duration::from_millis(250),
        }
    }
}

/// Converts elapsed wall-clock time into a simulation frame budget.
///
/// Keeps a running time debt: each iteration adds elapsed time (clamped at
/// the jank threshold), and each committed frame consumes one timestep of
/// it. Discarded excess is by definition not an error.
#[derive(Debug)]
pub struct TickScheduler {
    config: SchedulerConfig,
    debt: Duration,
    last: Option<Instant>,
}

impl TickScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            debt: Duration::ZERO,
            last: None,
        }
    }

    /// Fold elapsed wall time into the debt. Call once per iteration.
    pub fn update(&mut self, now: Instant) {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last);
            let debt = self.debt + elapsed;
            if debt > self.config.jank_threshold {
                trace!(
                    discarded_ms = (debt - self.config.jank_threshold).as_millis() as u64,
                    "discarding excess time debt"
                );
            }
            self.debt = debt.min(self.config.jank_threshold);
        }
        self.last = Some(now);
    }

    /// Whether at least one frame's worth of debt is available.
    pub fn due(&self) -> bool {
        self.debt >= self.config.timestep
    }

    /// Consume one timestep of debt after committing a frame.
    pub fn consume(&mut self) {
        self.debt = self.debt.saturating_sub(self.config.timestep);
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }
}

/// An independent wall-clock cadence for render/UI ticks.
///
/// Deliberately not derived from the simulation scheduler: presentation
/// stays responsive even while the simulation stalls waiting for peers.
#[derive(Debug)]
pub struct Cadence {
    interval: Duration,
    last: Option<Instant>,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether the interval has elapsed; arms the next interval if so.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
