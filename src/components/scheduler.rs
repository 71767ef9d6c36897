// ============================================================================
// SCHEDULER: explicit periodic and single-shot tasks, fired from `tick`
// ============================================================================

use std::time::{Duration, Instant};

/// Overlay geometry/visibility follow rate.
pub const OVERLAY_SYNC_INTERVAL: Duration = Duration::from_millis(16);
/// Delay of the second resync after a stroke or history action.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);
/// Delay before re-creating the overlay after a canvas switch.
pub const OVERLAY_REENABLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    OverlaySync,
    BoundsPoll,
    SettleResync,
    OverlayReenable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FiredTask {
    pub kind: TaskKind,
    /// Validity token captured at scheduling time. Periodic tasks carry 0.
    pub token: u64,
}

#[derive(Clone, Debug)]
struct Task {
    kind: TaskKind,
    due: Instant,
    period: Option<Duration>,
    token: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a periodic task; the first run is one period from `now`.
    pub fn start_periodic(&mut self, kind: TaskKind, period: Duration, now: Instant) {
        self.stop(kind);
        self.tasks.push(Task {
            kind,
            due: now + period,
            period: Some(period),
            token: 0,
        });
    }

    /// Queue a one-shot task. Several may be pending for the same kind.
    pub fn schedule_once(&mut self, kind: TaskKind, delay: Duration, now: Instant, token: u64) {
        self.tasks.push(Task {
            kind,
            due: now + delay,
            period: None,
            token,
        });
    }

    /// Cancel every task of `kind`, periodic or not.
    pub fn stop(&mut self, kind: TaskKind) {
        self.tasks.retain(|t| t.kind != kind);
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Earliest pending deadline, for hosts that sleep between ticks.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.due).min()
    }

    /// Pop every task due at `now`, in deadline order. Periodic tasks are
    /// re-armed; a late periodic task fires once, not once per missed period.
    pub fn drain_due(&mut self, now: Instant) -> Vec<FiredTask> {
        let mut fired: Vec<(Instant, FiredTask)> = Vec::new();
        self.tasks.retain_mut(|t| {
            if t.due > now {
                return true;
            }
            fired.push((
                t.due,
                FiredTask {
                    kind: t.kind,
                    token: t.token,
                },
            ));
            match t.period {
                Some(period) => {
                    t.due += period;
                    if t.due <= now {
                        t.due = now + period;
                    }
                    true
                }
                None => false,
            }
        });
        fired.sort_by_key(|(due, _)| *due);
        fired.into_iter().map(|(_, f)| f).collect()
    }
}
