use std::fmt;

/// Point-in-time counters of a pool. Fields are read independently, so a
/// snapshot taken under load is approximate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Tasks currently executing on a worker.
    pub active_tasks: usize,
    /// Workers blocked waiting for work.
    pub idle_workers: usize,
    /// Tasks accepted but not yet picked up.
    pub queued_tasks: usize,
    pub total_spawned: usize,
    /// Tasks that returned normally.
    pub completed_tasks: usize,
    /// Tasks that panicked or were cancelled before starting.
    pub failed_tasks: usize,
}

impl PoolMetrics {
    /// Share of non-idle workers that are running a task.
    pub fn utilization(&self) -> f64 {
        let workers = self.active_tasks + self.idle_workers;
        if workers == 0 {
            return 0.0;
        }
        self.active_tasks as f64 / workers as f64
    }

    /// Queued tasks per worker seen in this snapshot.
    pub fn queue_pressure(&self) -> f64 {
        let workers = (self.active_tasks + self.idle_workers).max(1);
        self.queued_tasks as f64 / workers as f64
    }

    /// Tasks queued or running.
    pub fn in_flight(&self) -> usize {
        self.queued_tasks + self.active_tasks
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.completed_tasks + self.failed_tasks;
        if finished == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / finished as f64
    }
}

impl fmt::Display for PoolMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spawned={} done={} failed={} queued={} active={} idle={} ({:.0}% ok)",
            self.total_spawned,
            self.completed_tasks,
            self.failed_tasks,
            self.queued_tasks,
            self.active_tasks,
            self.idle_workers,
            self.success_rate() * 100.0,
        )
    }
}


/// Scheduling priority for [`PriorityPool`](crate::pool::PriorityPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}
