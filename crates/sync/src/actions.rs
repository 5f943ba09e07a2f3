use std::sync::{Mutex, MutexGuard, PoisonError};

use lockstep_common::Frame;

type Action = Box<dyn FnOnce() + Send>;

struct Entry {
    due: Frame,
    seq: u64,
    action: Action,
}

#[derive(Default)]
struct Slots {
    next_seq: u64,
    entries: Vec<Entry>,
}

/// Deferred actions keyed on a due tick.
///
/// For UI-level follow-up work, not simulation commands: actions run after
/// the per-tick commit and must not assume simulation state consistency
/// across ticks. Enqueue is thread-safe; draining happens on the tick
/// thread only.
///
/// An action scheduled during a drain, even for the current tick, runs on
/// the next drain. The drain works on a snapshot, so the queue is never
/// re-entered while executing.
#[derive(Default)]
pub struct ActionQueue {
    inner: Mutex<Slots>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule `action` to run at the first drain where the current tick
    /// is at least `due`.
    pub fn schedule(&self, due: Frame, action: impl FnOnce() + Send + 'static) {
        let mut slots = self.lock();
        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.entries.push(Entry {
            due,
            seq,
            action: Box::new(action),
        });
    }

    /// Execute and remove every entry with `due <= current`, in due order
    /// and enqueue order within the same due tick.
    pub fn run_due(&self, current: Frame) {
        let mut due_entries = {
            let mut slots = self.lock();
            let entries = std::mem::take(&mut slots.entries);
            let (due, keep): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.due <= current);
            slots.entries = keep;
            due
        };
        due_entries.sort_by_key(|e| (e.due, e.seq));
        for entry in due_entries {
            (entry.action)();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_due_entries_in_enqueue_order() {
        let queue = ActionQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in [1u32, 2, 3] {
            let log = Arc::clone(&log);
            queue.schedule(5, move || log.lock().unwrap().push(label));
        }
        {
            let log = Arc::clone(&log);
            queue.schedule(9, move || log.lock().unwrap().push(99));
        }

        queue.run_due(5);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(queue.len(), 1);

        queue.run_due(9);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 99]);
        assert!(queue.is_empty());
    }

    #[test]
    fn overdue_entries_run_at_next_drain() {
        let queue = ActionQueue::new();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        queue.schedule(3, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        // Tick 3 was never drained; tick 7 picks the entry up anyway.
        queue.run_due(7);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rescheduling_for_the_running_tick_waits_one_drain() {
        let queue = Arc::new(ActionQueue::new());
        let hits = Arc::new(AtomicU64::new(0));

        let q = Arc::clone(&queue);
        let h = Arc::clone(&hits);
        queue.schedule(1, move || {
            h.fetch_add(1, Ordering::SeqCst);
            let h2 = Arc::clone(&h);
            q.schedule(1, move || {
                h2.fetch_add(1, Ordering::SeqCst);
            });
        });

        queue.run_due(1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        queue.run_due(1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn enqueue_is_thread_safe() {
        let queue = Arc::new(ActionQueue::new());
        let hits = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let hits = Arc::clone(&hits);
                std::thread::spawn(move || {
                    for tick in 1..=25u64 {
                        let hits = Arc::clone(&hits);
                        queue.schedule(tick, move || {
                            hits.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        queue.run_due(25);
        assert_eq!(hits.load(Ordering::SeqCst), 8 * 25);
        assert!(queue.is_empty());
    }
}
