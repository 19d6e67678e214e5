// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recurring-job scheduler.
//!
//! Runs N independently-configured jobs, each on its own tokio task:
//! - single-flight per job: a tick is skipped while the previous
//!   invocation of that job is still running
//! - a handler error or panic is logged and never halts other jobs
//!   or future ticks of the same job
//! - each job's first fire is jittered inside a configured window so
//!   a fleet restart does not stampede external providers
//! - `stop` signals cancellation cooperatively and waits out in-flight
//!   invocations up to a timeout

use crate::error::Result;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cooperative cancellation handle passed into every job invocation.
///
/// Handlers poll [`Shutdown::is_cancelled`] between items and finish
/// in-flight per-item work rather than aborting mid-call.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is signalled.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            // Sender dropped counts as shutdown.
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A recurring background job.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, shutdown: Shutdown) -> Result<()>;
}

struct JobSpec {
    name: &'static str,
    interval: Duration,
    job: Arc<dyn Job>,
}

/// Runs registered jobs on independent recurring ticks.
pub struct Scheduler {
    jitter_window: Duration,
    jobs: Vec<JobSpec>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(jitter_window: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jitter_window,
            jobs: Vec::new(),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, interval: Duration, job: Arc<dyn Job>) {
        self.jobs.push(JobSpec {
            name,
            interval,
            job,
        });
    }

    /// A shutdown handle observing this scheduler's stop signal.
    pub fn shutdown_handle(&self) -> Shutdown {
        Shutdown {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawn one task per registered job.
    pub fn start(&mut self) {
        for spec in self.jobs.drain(..) {
            let shutdown = Shutdown {
                rx: self.shutdown_tx.subscribe(),
            };
            let jitter = random_jitter(self.jitter_window);
            tracing::info!(
                job = spec.name,
                interval_secs = spec.interval.as_secs(),
                jitter_ms = jitter.as_millis() as u64,
                "Job scheduled"
            );
            let name = spec.name;
            let handle = tokio::spawn(run_job_loop(spec, jitter, shutdown));
            self.handles.push((name, handle));
        }
    }

    /// Signal cancellation and wait up to `timeout` for in-flight
    /// invocations to finish; whatever remains is aborted.
    pub async fn stop(&mut self, timeout: Duration) {
        tracing::info!("Scheduler stopping");
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + timeout;
        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => tracing::info!(job = name, "Job stopped"),
                Ok(Err(e)) => tracing::error!(job = name, error = %e, "Job task failed"),
                Err(_) => {
                    handle.abort();
                    tracing::warn!(job = name, "Job did not stop in time, aborted");
                }
            }
        }
    }
}

fn random_jitter(window: Duration) -> Duration {
    if window.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=window.as_millis() as u64))
}

async fn run_job_loop(spec: JobSpec, initial_jitter: Duration, mut shutdown: Shutdown) {
    // Jittered first fire.
    tokio::select! {
        _ = tokio::time::sleep(initial_jitter) => {}
        _ = shutdown.cancelled() => return,
    }

    let mut interval = tokio::time::interval(spec.interval);
    // Single-flight: ticks that land while a run is in progress are
    // dropped, not queued.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => break,
        }

        let job = spec.job.clone();
        let job_shutdown = shutdown.clone();
        // Own task per tick so a panic surfaces as a JoinError here
        // instead of tearing down the loop.
        let outcome = tokio::spawn(async move { job.run(job_shutdown).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(job = spec.name, error = %e, "Job tick failed"),
            Err(e) => tracing::error!(job = spec.name, error = %e, "Job tick panicked"),
        }

        if shutdown.is_cancelled() {
            break;
        }
    }
}
