//! Background work: the course generation consumer and the leader-only
//! maintenance sweeps scheduled with cron expressions.

pub mod course_generation;
pub mod queue;
pub mod reset_code_cleanup;
pub mod session_cleanup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::WorkerConfig;
use crate::store::Store;

/// Upper bound for one sweep.
const SWEEP_TIMEOUT: Duration = Duration::from_secs(120);

#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceJob {
    SessionCleanup,
    ResetCodeCleanup,
}

impl MaintenanceJob {
    pub const ALL: [MaintenanceJob; 2] = [Self::SessionCleanup, Self::ResetCodeCleanup];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCleanup => "session_cleanup",
            Self::ResetCodeCleanup => "reset_code_cleanup",
        }
    }

    /// Hourly; reset codes run on the half hour so the sweeps never overlap.
    pub fn cron(self) -> &'static str {
        match self {
            Self::SessionCleanup => "0 0 * * * *",
            Self::ResetCodeCleanup => "0 30 * * * *",
        }
    }

    async fn run(self, store: &Store) {
        match self {
            Self::SessionCleanup => session_cleanup::run(store).await,
            Self::ResetCodeCleanup => reset_code_cleanup::run(store).await,
        }
    }
}

/// Marks a job as running; cleared on drop so a timed-out or panicked
/// sweep does not block the next tick.
struct RunSlot(Arc<AtomicBool>);

impl RunSlot {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs the maintenance sweeps on the leader instance until shutdown.
pub struct WorkerManager {
    store: Arc<Store>,
    shutdown_rx: broadcast::Receiver<()>,
    is_leader: bool,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            shutdown_rx,
            is_leader: config.is_leader,
        }
    }

    /// Jobs this instance schedules. Followers schedule none.
    pub fn planned_jobs(&self) -> Vec<MaintenanceJob> {
        if self.is_leader {
            MaintenanceJob::ALL.to_vec()
        } else {
            Vec::new()
        }
    }

    pub async fn start(mut self) -> Result<(), WorkerError> {
        let jobs = self.planned_jobs();
        if jobs.is_empty() {
            tracing::info!("Not the worker leader; maintenance jobs disabled");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        for job in jobs {
            match scheduler.add(self.cron_job(job)?).await {
                Ok(_) => tracing::info!(job = job.as_str(), cron = job.cron(), "Maintenance job scheduled"),
                Err(e) => tracing::error!(job = job.as_str(), error = %e, "Failed to schedule maintenance job"),
            }
        }
        scheduler.start().await?;
        tracing::info!("Worker manager started");

        let _ = self.shutdown_rx.recv().await;
        tracing::info!(drain_ms = DRAIN_TIMEOUT.as_millis() as u64, "Worker manager stopping");
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        scheduler.shutdown().await?;
        Ok(())
    }

    fn cron_job(&self, job: MaintenanceJob) -> Result<Job, JobSchedulerError> {
        let store = self.store.clone();
        let running = Arc::new(AtomicBool::new(false));

        Job::new_async(job.cron(), move |_id, _scheduler| {
            let store = store.clone();
            let slot = RunSlot::try_acquire(&running);
            Box::pin(async move {
                let Some(_slot) = slot else {
                    tracing::warn!(job = job.as_str(), "Previous run still active; tick skipped");
                    return;
                };
                if tokio::time::timeout(SWEEP_TIMEOUT, job.run(&store)).await.is_err() {
                    tracing::error!(
                        job = job.as_str(),
                        timeout_secs = SWEEP_TIMEOUT.as_secs(),
                        "Maintenance job timed out"
                    );
                }
            })
        })
    }
}
