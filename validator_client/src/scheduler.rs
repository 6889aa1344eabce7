//! A named-job scheduler aligned to absolute deadlines.
//!
//! Jobs run at or after their not-before time (plus a bounded jitter), at
//! most once per name. They can be cancelled individually or by name prefix,
//! or nudged to run immediately — used when a head event makes waiting for a
//! duty's scheduled offset pointless.

use crate::metrics;
use parking_lot::Mutex;
use rand::Rng;
use slog::{debug, Logger};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use task_executor::TaskExecutor;
use tokio::sync::oneshot;
use tokio::time::Instant;

struct JobControl {
    cancel: Option<oneshot::Sender<()>>,
    nudge: Option<oneshot::Sender<()>>,
}

struct Inner {
    jobs: Mutex<HashMap<String, JobControl>>,
    max_jitter: Duration,
    executor: TaskExecutor,
    log: Logger,
}

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(executor: TaskExecutor, max_jitter: Duration, log: Logger) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                max_jitter,
                executor,
                log,
            }),
        }
    }

    /// Register `job` to run at or after `not_before`. A name that is already
    /// scheduled is left untouched; the second registration is dropped.
    pub fn schedule<F>(&self, name: String, not_before: Instant, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (nudge_tx, nudge_rx) = oneshot::channel();

        {
            let mut jobs = self.inner.jobs.lock();
            if jobs.contains_key(&name) {
                debug!(self.inner.log, "Job already scheduled"; "job" => %name);
                return;
            }
            jobs.insert(
                name.clone(),
                JobControl {
                    cancel: Some(cancel_tx),
                    nudge: Some(nudge_tx),
                },
            );
        }

        let jitter = if self.inner.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            self.inner
                .max_jitter
                .mul_f64(rand::thread_rng().gen::<f64>())
        };

        let inner = self.inner.clone();
        let task = async move {
            let mut cancel_rx = cancel_rx;
            let mut nudge_rx = nudge_rx;
            tokio::pin! {
                let wakeup = tokio::time::sleep_until(not_before + jitter);
            }
            let mut nudge_dead = false;
            loop {
                tokio::select! {
                    _ = &mut wakeup => break,
                    nudged = &mut nudge_rx, if !nudge_dead => {
                        if nudged.is_ok() {
                            break;
                        }
                        // Control side dropped without nudging; wait out the
                        // schedule unless cancelled.
                        nudge_dead = true;
                    }
                    _ = &mut cancel_rx => {
                        metrics::inc_counter_vec(&metrics::SCHEDULER_JOBS, &["cancelled"]);
                        return;
                    }
                }
            }

            // Claim the job. Losing the claim means a concurrent cancel won.
            if inner.jobs.lock().remove(&name).is_none() {
                metrics::inc_counter_vec(&metrics::SCHEDULER_JOBS, &["cancelled"]);
                return;
            }

            debug!(inner.log, "Running job"; "job" => %name);
            job.await;
            metrics::inc_counter_vec(&metrics::SCHEDULER_JOBS, &["completed"]);
        };

        self.inner.executor.spawn(task, "scheduled_job");
    }

    /// Cancel a job by name. A job that has already claimed its run is
    /// unaffected.
    pub fn cancel(&self, name: &str) {
        if let Some(mut control) = self.inner.jobs.lock().remove(name) {
            if let Some(cancel) = control.cancel.take() {
                let _ = cancel.send(());
            }
        }
    }

    /// Cancel every job whose name starts with `prefix`.
    pub fn cancel_prefix(&self, prefix: &str) {
        let mut jobs = self.inner.jobs.lock();
        let names: Vec<String> = jobs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        for name in names {
            if let Some(mut control) = jobs.remove(&name) {
                if let Some(cancel) = control.cancel.take() {
                    let _ = cancel.send(());
                }
            }
        }
    }

    /// Run a scheduled job immediately instead of waiting for its not-before
    /// time. No-op if the name is not scheduled.
    pub fn run_now(&self, name: &str) {
        let mut jobs = self.inner.jobs.lock();
        match jobs.get_mut(name) {
            Some(control) => {
                if let Some(nudge) = control.nudge.take() {
                    let _ = nudge.send(());
                }
            }
            None => {
                debug!(self.inner.log, "No such job to run"; "job" => %name);
            }
        }
    }

    /// Number of jobs currently waiting to run.
    pub fn pending_jobs(&self) -> usize {
        self.inner.jobs.lock().len()
    }
}
