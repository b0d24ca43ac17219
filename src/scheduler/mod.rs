//! Cron Scheduler
//!
//! Runs registered jobs on cron schedules inside this process, next to the
//! queue workers. Expressions take five fields (minute first) or six
//! (seconds first) and are evaluated in UTC.
//!
//! A job never overlaps itself: the next fire time is computed after the
//! previous run returns, and slots missed while it ran are skipped.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{CoordError, Result};
use crate::queue::panic_message;

type JobFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Parses a 5-field (`min hour dom month dow`) or 6-field
/// (`sec min hour dom month dow`) cron expression.
pub fn parse_cron(expression: &str) -> Result<Schedule> {
    let fields = expression.split_whitespace().count();
    let normalized = match fields {
        5 => format!("0 {}", expression.trim()),
        6 => expression.trim().to_string(),
        n => {
            return Err(CoordError::InvalidRequest(format!(
                "cron expression '{}' has {} fields, expected 5 or 6",
                expression, n
            )))
        }
    };
    Schedule::from_str(&normalized).map_err(|e| {
        CoordError::InvalidRequest(format!("invalid cron expression '{}': {}", expression, e))
    })
}

struct ScheduledJob {
    id: String,
    expression: String,
    schedule: Schedule,
    job: Arc<JobFn>,
}

struct Running {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

// == Scheduler ==
/// Owns the cron jobs registered at startup and their timer loops.
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<Vec<ScheduledJob>>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `job` to run on `expression`, replacing any job already
    /// registered under `id`.
    ///
    /// Jobs registered after [`Scheduler::init`] wait for the next `init`.
    ///
    /// # Arguments
    /// * `id` - Unique job name, used in logs
    /// * `expression` - 5-field or 6-field cron expression, in UTC
    /// * `job` - Async closure run at every fire time; errors and panics are
    ///   logged and do not stop the schedule
    ///
    /// # Returns
    /// `Err(CoordError::InvalidRequest)` when the expression does not parse.
    ///
    /// # Example
    /// ```ignore
    /// scheduler.scheduled_task("nightly_report", "0 3 * * *", || async {
    ///     build_report().await
    /// })?;
    /// ```
    pub fn scheduled_task<F, Fut>(&self, id: &str, expression: &str, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let schedule = parse_cron(expression)?;
        let entry = ScheduledJob {
            id: id.to_string(),
            expression: expression.to_string(),
            schedule,
            job: Arc::new(move || job().boxed()),
        };

        let mut jobs = self.jobs();
        match jobs.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => {
                *existing = entry;
                info!(job = %id, cron = %expression, "Scheduled job replaced");
            }
            None => {
                jobs.push(entry);
                info!(job = %id, cron = %expression, "Scheduled job registered");
            }
        }
        Ok(())
    }

    /// Starts one timer loop per registered job. Calling it while already
    /// running does nothing.
    pub fn init(&self) {
        let mut running = self.running();
        if running.is_some() {
            warn!("Scheduler already running");
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let handles: Vec<JoinHandle<()>> = self
            .jobs()
            .iter()
            .map(|entry| {
                tokio::spawn(run_job(
                    entry.id.clone(),
                    entry.schedule.clone(),
                    Arc::clone(&entry.job),
                    stop_rx.clone(),
                ))
            })
            .collect();

        info!(count = handles.len(), "Scheduler started");
        *running = Some(Running { stop, handles });
    }

    /// Stops every timer loop. A job that is mid-run finishes first; no new
    /// runs start afterwards.
    pub async fn close(&self) {
        let running = self.running().take();
        let Some(Running { stop, handles }) = running else {
            return;
        };

        let _ = stop.send(true);
        let count = handles.len();
        for outcome in join_all(handles).await {
            if let Err(e) = outcome {
                warn!(error = %e, "Scheduled job loop did not exit cleanly");
            }
        }
        info!(count, "Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Registered `(id, expression)` pairs, in registration order.
    pub fn job_list(&self) -> Vec<(String, String)> {
        self.jobs()
            .iter()
            .map(|entry| (entry.id.clone(), entry.expression.clone()))
            .collect()
    }

    /// Next fire time of job `id` after now.
    pub fn next_run(&self, id: &str) -> Option<DateTime<Utc>> {
        self.jobs()
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.schedule.upcoming(Utc).next())
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }
}

/// Sleeps until each fire time and runs the job inline.
async fn run_job(id: String, schedule: Schedule, job: Arc<JobFn>, mut stop: watch::Receiver<bool>) {
    let mut after = Utc::now();

    loop {
        let Some(next) = schedule.after(&after).next() else {
            info!(job = %id, "Schedule has no further fire times");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        debug!(job = %id, "Scheduled job firing");
        match AssertUnwindSafe(job()).catch_unwind().await {
            Ok(Ok(())) => debug!(job = %id, "Scheduled job finished"),
            Ok(Err(e)) => error!(job = %id, error = %e, "Scheduled job failed"),
            Err(panic) => {
                let message = CoordError::HandlerPanicked(panic_message(panic.as_ref()));
                error!(job = %id, error = %message, "Scheduled job failed");
            }
        }

        after = std::cmp::max(next, Utc::now());
    }

    debug!(job = %id, "Scheduled job loop exited");
}
