use std::future::Future;
use std::time::Duration;

use faktory::{Job, WorkerBuilder};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerSettings;
use crate::error::{DispatchError, RuntimeError};
use crate::worker::dispatcher::{Dispatcher, ExecutionResult};
use crate::worker::queues::WeightedQueues;

/// Owns the worker slots that fetch jobs from the broker and hand them to the
/// [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct Manager {
    concurrency: usize,
    queues: WeightedQueues,
    dispatcher: Dispatcher,
    backoff: Backoff,
}

impl Manager {
    pub fn new(settings: &WorkerSettings, dispatcher: Dispatcher) -> Self {
        Self {
            concurrency: settings.concurrency,
            queues: WeightedQueues::new(&settings.queues),
            dispatcher,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn queues(&self) -> &WeightedQueues {
        &self.queues
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run the worker slots until `shutdown` is cancelled.
    ///
    /// Each slot holds its own broker connection and runs one job at a time, so
    /// at most `concurrency` commands run at once. A job in progress when
    /// shutdown is requested runs to completion before its slot exits. Broker
    /// errors never end a slot: it reconnects with backoff until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error only if a slot task panicked. The other slots are asked
    /// to stop and awaited before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), RuntimeError> {
        tracing::info!(
            concurrency = self.concurrency,
            job_types = ?self.dispatcher.job_types().collect::<Vec<_>>(),
            "Starting worker manager"
        );

        let mut slots = JoinSet::new();
        for slot in 0..self.concurrency {
            slots.spawn(Self::run_slot(
                slot,
                self.dispatcher.clone(),
                self.queues.clone(),
                self.backoff.clone(),
                shutdown.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker slot panicked");
                shutdown.cancel();
                first_error.get_or_insert(RuntimeError::from(e));
            }
        }

        tracing::info!("Worker manager stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_slot(
        slot: usize,
        dispatcher: Dispatcher,
        queues: WeightedQueues,
        backoff: Backoff,
        shutdown: CancellationToken,
    ) {
        while !shutdown.is_cancelled() {
            // Broker address comes from FAKTORY_URL
            let connect = || build_worker(&dispatcher).connect();
            let Some(mut worker) = retry_until_ok(slot, &backoff, &shutdown, connect).await else {
                break;
            };
            tracing::info!(slot, "Worker slot connected");

            while !shutdown.is_cancelled() {
                let order = queues.poll_order(&mut rand::thread_rng());
                tracing::trace!(slot, queues = ?order, "Fetching");
                if let Err(e) = worker.run_one(0, &order[..]).await {
                    // An unacknowledged job is handed out again by the broker
                    tracing::error!(slot, error = %e, "Broker connection failed, reconnecting");
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(backoff.initial) => {}
                    }
                    break;
                }
            }
        }

        tracing::info!(slot, "Worker slot stopped");
    }
}

fn build_worker(dispatcher: &Dispatcher) -> WorkerBuilder<DispatchError> {
    let mut builder = WorkerBuilder::<DispatchError>::default();
    for job_type in dispatcher.job_types() {
        let dispatcher = dispatcher.clone();
        builder = builder.register_fn(job_type, move |job: Job| {
            let dispatcher = dispatcher.clone();
            async move { perform_job(&dispatcher, &job).await.map(|_| ()) }
        });
    }
    builder
}

/// Exponential delay between broker connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay after the given number of consecutive failures (starting at 1).
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Call `attempt` until it succeeds, sleeping with backoff between failures.
///
/// Returns `None` once `shutdown` is cancelled, including while waiting.
pub async fn retry_until_ok<T, E, F, Fut>(
    slot: usize,
    backoff: &Backoff,
    shutdown: &CancellationToken,
    mut attempt: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut failures = 0u32;
    while !shutdown.is_cancelled() {
        match attempt().await {
            Ok(value) => return Some(value),
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = backoff.delay(failures);
                tracing::warn!(
                    slot,
                    failures,
                    retry_in = ?delay,
                    error = %e,
                    "Failed to connect to broker"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    None
}

/// Dispatch a job fetched from the broker.
pub async fn perform_job(
    dispatcher: &Dispatcher,
    job: &Job,
) -> Result<ExecutionResult, DispatchError> {
    let jid = job.id().to_string();
    dispatcher.perform(job.kind(), &jid, job.args()).await
}
