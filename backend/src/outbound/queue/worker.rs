//! Polling worker pool over the durable job store.
//!
//! Each job family gets its own set of polling tasks sized by the family's
//! default concurrency. A failed attempt is rescheduled with the family's
//! backoff plus a little jitter so retries from a shared outage do not land
//! on the same instant; a job that exhausts its attempts is left terminally
//! failed for operator inspection.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use mockable::Clock;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::ports::{JobCompletion, JobStore, TokenAnalyticsRepository, TokenRepository};
use crate::domain::scheduler::jobs::{ClaimedJob, JobFamily};
use crate::domain::scheduler::{JobOutcome, SchedulingOrchestrator};

const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);
const MAX_JITTER_MS: i64 = 1_000;

/// Spawns and supervises the per-family worker tasks.
pub struct WorkerPool<T: ?Sized, A: ?Sized> {
    orchestrator: Arc<SchedulingOrchestrator<T, A>>,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    poll_interval: StdDuration,
}

/// Handle over running workers; dropping it does not stop them.
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signal every worker to stop and wait for in-flight attempts to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "worker task panicked");
            }
        }
    }
}

impl<T: ?Sized, A: ?Sized> WorkerPool<T, A>
where
    T: TokenRepository + 'static,
    A: TokenAnalyticsRepository + 'static,
{
    pub fn new(
        orchestrator: Arc<SchedulingOrchestrator<T, A>>,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the idle poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: StdDuration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start one polling task per unit of each family's concurrency.
    pub fn spawn(self) -> WorkerPoolHandle {
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        for family in JobFamily::ALL {
            for worker in 0..family.default_concurrency() {
                let orchestrator = Arc::clone(&self.orchestrator);
                let store = Arc::clone(&self.store);
                let clock = Arc::clone(&self.clock);
                let mut stop = shutdown.subscribe();
                let poll_interval = self.poll_interval;

                tasks.push(tokio::spawn(async move {
                    info!(family = family.as_str(), worker, "worker started");
                    loop {
                        if *stop.borrow() {
                            break;
                        }
                        let drained =
                            drain_family(&orchestrator, store.as_ref(), clock.as_ref(), family)
                                .await;
                        if drained == 0 {
                            tokio::select! {
                                _ = stop.changed() => {}
                                () = tokio::time::sleep(poll_interval) => {}
                            }
                        }
                    }
                    info!(family = family.as_str(), worker, "worker stopped");
                }));
            }
        }

        WorkerPoolHandle { shutdown, tasks }
    }
}

/// Claim and run due jobs of one family until the queue is empty. Returns
/// the number of attempts made.
async fn drain_family<T: ?Sized, A: ?Sized>(
    orchestrator: &SchedulingOrchestrator<T, A>,
    store: &dyn JobStore,
    clock: &dyn Clock,
    family: JobFamily,
) -> usize
where
    T: TokenRepository,
    A: TokenAnalyticsRepository,
{
    let mut processed = 0;
    loop {
        let claimed = match store.claim_due(family, clock.utc()).await {
            Ok(Some(job)) => job,
            Ok(None) => return processed,
            Err(err) => {
                warn!(family = family.as_str(), error = %err, "claim failed");
                return processed;
            }
        };
        processed += 1;
        run_attempt(orchestrator, store, clock, family, claimed).await;
    }
}

async fn run_attempt<T: ?Sized, A: ?Sized>(
    orchestrator: &SchedulingOrchestrator<T, A>,
    store: &dyn JobStore,
    clock: &dyn Clock,
    family: JobFamily,
    job: ClaimedJob,
) where
    T: TokenRepository,
    A: TokenAnalyticsRepository,
{
    let completion = match orchestrator.handle(&job.payload).await {
        Ok(JobOutcome::Completed) => {
            debug!(family = family.as_str(), job_id = %job.id, "job completed");
            JobCompletion::Succeeded
        }
        Ok(JobOutcome::Skipped { reason }) => {
            info!(family = family.as_str(), job_id = %job.id, reason, "job skipped");
            JobCompletion::Succeeded
        }
        Err(err) => {
            let policy = family.retry_policy();
            if job.attempt >= policy.max_attempts {
                error!(
                    family = family.as_str(),
                    job_id = %job.id,
                    attempt = job.attempt,
                    error = %err,
                    "job exhausted its attempts"
                );
                JobCompletion::Failed {
                    error: err.to_string(),
                    retry_at: None,
                }
            } else {
                let delay = policy.delay_after(job.attempt) + jitter();
                warn!(
                    family = family.as_str(),
                    job_id = %job.id,
                    attempt = job.attempt,
                    retry_in_seconds = delay.num_seconds(),
                    error = %err,
                    "job attempt failed"
                );
                JobCompletion::Failed {
                    error: err.to_string(),
                    retry_at: Some(clock.utc() + delay),
                }
            }
        }
    };

    if let Err(err) = store.finish(&job.id, completion).await {
        error!(family = family.as_str(), job_id = %job.id, error = %err, "finish failed");
    }
}

fn jitter() -> Duration {
    let mut rng = SmallRng::from_entropy();
    Duration::milliseconds(rng.gen_range(0..MAX_JITTER_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockable::DefaultClock;

    use crate::domain::ports::{
        FixtureGroupDirectory, FixtureJobQueue, FixtureJobStore, FixtureMailer,
        FixturePromptRepository, FixtureResponseRepository, FixtureSettingsRepository,
        FixtureSuggestionRepository, FixtureTokenAnalyticsRepository, FixtureTokenRepository,
        PromptRepository, SuggestionRepository,
    };
    use crate::domain::scheduler::OrchestratorDeps;
    use crate::domain::token_codec::{SigningContext, TokenCodec};
    use crate::domain::token_service::TokenService;
    use crate::domain::PromptLifecycle;

    #[test]
    fn jitter_stays_under_a_second() {
        for _ in 0..32 {
            let sample = jitter();
            assert!(sample >= Duration::zero());
            assert!(sample < Duration::milliseconds(MAX_JITTER_MS));
        }
    }

    #[tokio::test]
    async fn pool_spins_up_and_shuts_down_with_nothing_queued() {
        let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
        let tokens = Arc::new(TokenService::new(
            TokenCodec::new(SigningContext::from_secret(b"worker-test-secret")),
            Arc::new(FixtureTokenRepository) as Arc<dyn TokenRepository>,
            Arc::new(FixtureTokenAnalyticsRepository) as Arc<dyn TokenAnalyticsRepository>,
            clock.clone(),
        ));
        let prompts = Arc::new(FixturePromptRepository) as Arc<dyn PromptRepository>;
        let suggestions = Arc::new(FixtureSuggestionRepository) as Arc<dyn SuggestionRepository>;
        let lifecycle = Arc::new(PromptLifecycle::new(
            prompts.clone(),
            suggestions.clone(),
            clock.clone(),
        ));
        let orchestrator = Arc::new(SchedulingOrchestrator::new(OrchestratorDeps {
            tokens,
            lifecycle,
            prompts,
            responses: Arc::new(FixtureResponseRepository),
            suggestions,
            settings: Arc::new(FixtureSettingsRepository),
            directory: Arc::new(FixtureGroupDirectory),
            mailer: Arc::new(FixtureMailer),
            queue: Arc::new(FixtureJobQueue),
            clock: clock.clone(),
            form_base_url: "https://gamenight.test".to_owned(),
        }));

        // No configured groups means nothing to plan.
        assert_eq!(orchestrator.plan_cadence().await.expect("plans"), 0);

        let handle = WorkerPool::new(orchestrator, Arc::new(FixtureJobStore), clock)
            .with_poll_interval(StdDuration::from_millis(10))
            .spawn();
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        handle.shutdown().await;
    }
}
