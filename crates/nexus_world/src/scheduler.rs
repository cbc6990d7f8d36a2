//! The tick scheduler actor.
//!
//! Jobs register a period and a bounded(1) mailbox. When a job fires while
//! its previous tick is still unconsumed, the firing is skipped rather than
//! queued, so a slow zone never builds a backlog of stale ticks.

use std::time::Duration;

use flume::TrySendError;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use nexus_network::clock::monotonic_ms;

use crate::scheduled::Scheduled;

pub type JobId = u64;

enum SchedulerMessage {
    Add {
        id: JobId,
        period_ms: u64,
        target: flume::Sender<()>,
    },
    Remove {
        id: JobId,
    },
}

#[derive(Clone)]
pub struct SchedulerHandle {
    tx: flume::Sender<SchedulerMessage>,
}

impl SchedulerHandle {
    /// Registers a periodic job. `target` should be a bounded(1) channel;
    /// its consumer receives at most one outstanding tick.
    pub fn add_job(&self, id: JobId, period_ms: u64, target: flume::Sender<()>) {
        let _ = self.tx.send(SchedulerMessage::Add { id, period_ms, target });
    }

    /// Cancels a job. Zones remove their job before tearing down.
    pub fn remove_job(&self, id: JobId) {
        let _ = self.tx.send(SchedulerMessage::Remove { id });
    }
}

struct Job {
    period_ms: u64,
    target: flume::Sender<()>,
}

pub struct TickScheduler {
    rx: flume::Receiver<SchedulerMessage>,
    jobs: FxHashMap<JobId, Job>,
    due: Scheduled<JobId>,
}

impl TickScheduler {
    /// Spawns the scheduler actor.
    pub fn spawn() -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let scheduler = Self {
            rx,
            jobs: FxHashMap::default(),
            due: Scheduled::new(),
        };
        let task = tokio::spawn(scheduler.run());
        (SchedulerHandle { tx }, task)
    }

    async fn run(mut self) {
        loop {
            let now = monotonic_ms();
            let wait = match self.due.next_due() {
                Some(at) => Duration::from_millis(at.saturating_sub(now)),
                // Idle until a job shows up.
                None => Duration::from_secs(3600),
            };

            tokio::select! {
                msg = self.rx.recv_async() => match msg {
                    Ok(SchedulerMessage::Add { id, period_ms, target }) => {
                        self.due.schedule(monotonic_ms() + period_ms, id);
                        self.jobs.insert(id, Job { period_ms, target });
                    }
                    Ok(SchedulerMessage::Remove { id }) => {
                        self.jobs.remove(&id);
                    }
                    // All handles dropped: shut down.
                    Err(_) => return,
                },
                () = tokio::time::sleep(wait) => self.fire_due(),
            }
        }
    }

    fn fire_due(&mut self) {
        let now = monotonic_ms();
        let due: Vec<JobId> = self.due.pop_until(now).map(|(_, id)| id).collect();
        for id in due {
            let Some(job) = self.jobs.get(&id) else {
                // Removed while queued; let it lapse.
                continue;
            };
            match job.target.try_send(()) {
                Ok(()) => trace!(job = id, "tick dispatched"),
                Err(TrySendError::Full(())) => {
                    // Previous tick still running; skip, never queue.
                    debug!(job = id, "tick overrun, skipping");
                }
                Err(TrySendError::Disconnected(())) => {
                    debug!(job = id, "tick target gone, removing job");
                    self.jobs.remove(&id);
                    continue;
                }
            }
            let period = self.jobs[&id].period_ms;
            self.due.schedule(now + period, id);
        }
    }
}
