//! Background maintenance scheduling
//!
//! Consolidation and forgetting run as explicit scheduled tasks consuming a
//! work queue with idempotent, re-runnable handlers - not ambient timers
//! buried in the request path. Interval tickers enqueue jobs; one worker
//! drains them. Job failures are logged and never stop the scheduler loop,
//! and running the queue twice over the same state is harmless (both
//! handlers are idempotent by construction).

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::ConfigHandle;
use crate::consolidation::{ConsolidationEngine, ConsolidationReport};
use crate::forgetting::{run_sweep, SweepReport};
use crate::store::MemoryStore;

/// One unit of maintenance work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceJob {
    /// Consolidate one owner's recent episodic memories
    Consolidate { owner: String },
    /// Retention sweep over the whole store
    Sweep,
}

/// Combined outcome of a queue drain (for the maintenance endpoints)
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct MaintenanceOutcome {
    pub jobs_run: usize,
    pub consolidation: Vec<ConsolidationReport>,
    pub sweep: Option<SweepReport>,
}

/// Work queue with deduplication
///
/// Enqueueing a job already waiting is a no-op: a sweep scheduled twice
/// before the worker gets to it still runs once.
pub struct MaintenanceQueue {
    jobs: Mutex<VecDeque<MaintenanceJob>>,
}

impl Default for MaintenanceQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    pub fn enqueue(&self, job: MaintenanceJob) {
        let mut jobs = self.jobs.lock();
        if !jobs.contains(&job) {
            jobs.push_back(job);
        }
    }

    pub fn dequeue(&self) -> Option<MaintenanceJob> {
        self.jobs.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

/// Background scheduler owning the queue and its worker tasks
pub struct Scheduler {
    store: Arc<MemoryStore>,
    consolidation: Arc<ConsolidationEngine>,
    config: ConfigHandle,
    queue: Arc<MaintenanceQueue>,
}

impl Scheduler {
    pub fn new(
        store: Arc<MemoryStore>,
        consolidation: Arc<ConsolidationEngine>,
        config: ConfigHandle,
    ) -> Self {
        Self {
            store,
            consolidation,
            config,
            queue: Arc::new(MaintenanceQueue::new()),
        }
    }

    pub fn queue(&self) -> &Arc<MaintenanceQueue> {
        &self.queue
    }

    /// Enqueue a sweep plus a consolidation job per known owner
    pub fn schedule_cycle(&self) {
        self.queue.enqueue(MaintenanceJob::Sweep);
        for owner in self.store.all_owners() {
            self.queue.enqueue(MaintenanceJob::Consolidate { owner });
        }
    }

    /// Drain the queue synchronously, isolating per-job failures
    ///
    /// Used by the worker task, the maintenance endpoints, and tests.
    pub async fn run_pending(&self) -> MaintenanceOutcome {
        let mut outcome = MaintenanceOutcome::default();
        let config = self.config.snapshot();

        while let Some(job) = self.queue.dequeue() {
            outcome.jobs_run += 1;
            match job {
                MaintenanceJob::Sweep => {
                    let report = run_sweep(&self.store, &config);
                    outcome.sweep = Some(report);
                }
                MaintenanceJob::Consolidate { owner } => {
                    let report = self.consolidation.consolidate_owner(&owner, &config).await;
                    outcome.consolidation.push(report);
                }
            }
        }

        outcome
    }

    /// Spawn the interval tickers and the queue worker
    ///
    /// The returned handles live for the process; aborting them is the
    /// shutdown path. Maintenance never blocks the request path - it only
    /// ever touches the store through the same short-lived per-owner locks.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let config = self.config.snapshot();
        let mut handles = Vec::new();

        // Sweep ticker
        {
            let scheduler = Arc::clone(self);
            let interval = Duration::from_secs(config.sweep_interval_secs);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // immediate first tick consumed
                loop {
                    ticker.tick().await;
                    scheduler.queue.enqueue(MaintenanceJob::Sweep);
                }
            }));
        }

        // Consolidation ticker
        {
            let scheduler = Arc::clone(self);
            let interval = Duration::from_secs(config.consolidation_interval_secs);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    for owner in scheduler.store.all_owners() {
                        scheduler
                            .queue
                            .enqueue(MaintenanceJob::Consolidate { owner });
                    }
                }
            }));
        }

        // Queue worker
        {
            let scheduler = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                loop {
                    if scheduler.queue.is_empty() {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                    let outcome = scheduler.run_pending().await;
                    tracing::debug!(jobs = outcome.jobs_run, "maintenance jobs drained");
                }
            }));
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_deduplicates() {
        let queue = MaintenanceQueue::new();
        queue.enqueue(MaintenanceJob::Sweep);
        queue.enqueue(MaintenanceJob::Sweep);
        queue.enqueue(MaintenanceJob::Consolidate {
            owner: "alice".to_string(),
        });
        queue.enqueue(MaintenanceJob::Consolidate {
            owner: "alice".to_string(),
        });
        queue.enqueue(MaintenanceJob::Consolidate {
            owner: "bob".to_string(),
        });

        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_queue_fifo_order() {
        let queue = MaintenanceQueue::new();
        queue.enqueue(MaintenanceJob::Sweep);
        queue.enqueue(MaintenanceJob::Consolidate {
            owner: "alice".to_string(),
        });

        assert_eq!(queue.dequeue(), Some(MaintenanceJob::Sweep));
        assert!(matches!(
            queue.dequeue(),
            Some(MaintenanceJob::Consolidate { .. })
        ));
        assert!(queue.dequeue().is_none());
    }
}
