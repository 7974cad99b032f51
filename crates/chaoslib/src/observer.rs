use std::time::Duration;

use crate::clock::Clock;
use crate::cluster::{ClusterClient, HealthPredicate, Selector};
use crate::error::{Error, ObservationError};

/// Default time between two healthy-count queries.
pub static DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on a single observation.
pub static DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of consecutive failed queries after which we stop observing.
pub static DEFAULT_RETRY_BUDGET: u32 = 3;

/// What "recovered" means for one observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryTarget {
    pub selector: Selector,
    pub desired_count: u32,
    pub predicate: HealthPredicate,
}

impl RecoveryTarget {
    /// Construct a target with an explicit desired count, which must be at
    /// least 1.
    pub fn new(
        selector: Selector,
        desired_count: u32,
        predicate: HealthPredicate,
    ) -> Result<Self, Error> {
        if desired_count == 0 {
            return Err(Error::InvalidTarget(format!(
                "desired count for '{selector}' must be at least 1"
            )));
        }

        Ok(Self {
            selector,
            desired_count,
            predicate,
        })
    }

    /// Construct a target whose desired count is the declared replica count
    /// of `workload`, as of now.
    pub async fn from_workload<C: ClusterClient>(
        client: &C,
        workload: &str,
        selector: Selector,
        predicate: HealthPredicate,
    ) -> Result<Self, Error> {
        let desired_count = client.count_desired(workload).await?;
        if desired_count == 0 {
            return Err(Error::TargetNotFound(format!(
                "workload '{workload}' is scaled to zero"
            )));
        }

        Self::new(selector, desired_count, predicate)
    }
}

/// How to poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub retry_budget: u32,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// One successful healthy-count query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    pub healthy: u32,
    pub desired: u32,
    pub elapsed: Duration,
}

/// The result of an observation which saw the system, whether or not it
/// healed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub recovered: bool,
    /// Time from the start of the observation to the first sample meeting
    /// the target, or to the cutoff.
    pub elapsed: Duration,
    pub final_healthy_count: u32,
    pub desired_count: u32,
    pub samples: u32,
}

impl RecoveryOutcome {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Polls a health signal until it reaches the target or the time runs out.
/// Never changes cluster state.
#[derive(Debug)]
pub struct RecoveryObserver<'a, C, K> {
    client: &'a C,
    clock: &'a K,
    config: ObserverConfig,
}

impl<'a, C: ClusterClient + Sync, K: Clock + Sync> RecoveryObserver<'a, C, K> {
    pub fn new(client: &'a C, clock: &'a K, config: ObserverConfig) -> Self {
        Self {
            client,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Observe until the number of healthy instances is at least the
    /// desired count (recovered), the timeout passes (not recovered), or
    /// the query fails `retry_budget` times in a row (error).
    ///
    /// `on_sample` is called with every successful query.
    pub async fn observe<F: FnMut(&Sample)>(
        &self,
        target: &RecoveryTarget,
        mut on_sample: F,
    ) -> Result<RecoveryOutcome, Error> {
        let start = self.clock.now();
        let mut last_sample: Option<u32> = None;
        let mut failures = 0;
        let mut samples = 0;

        loop {
            let result = self
                .client
                .count_healthy(&target.selector, target.predicate)
                .await;
            let elapsed = self.clock.now().saturating_sub(start);

            match result {
                Ok(healthy) => {
                    failures = 0;
                    samples += 1;
                    last_sample = Some(healthy);
                    on_sample(&Sample {
                        healthy,
                        desired: target.desired_count,
                        elapsed,
                    });

                    if healthy >= target.desired_count {
                        tracing::info!(selector = %target.selector, healthy, ?elapsed, "target recovered");
                        return Ok(RecoveryOutcome {
                            recovered: true,
                            elapsed,
                            final_healthy_count: healthy,
                            desired_count: target.desired_count,
                            samples,
                        });
                    }
                }
                Err(error) => {
                    failures += 1;
                    tracing::warn!(selector = %target.selector, failures, ?error, "could not query healthy count");

                    // a timeout with nothing ever seen is a failure to observe
                    if failures >= self.config.retry_budget
                        || (elapsed >= self.config.timeout && last_sample.is_none())
                    {
                        return Err(ObservationError {
                            failures,
                            last_sample,
                            elapsed,
                            cause: Box::new(error),
                        }
                        .into());
                    }
                }
            }

            if elapsed >= self.config.timeout {
                if let Some(healthy) = last_sample {
                    tracing::warn!(selector = %target.selector, healthy, ?elapsed, "target did not recover in time");
                    return Ok(RecoveryOutcome {
                        recovered: false,
                        elapsed,
                        final_healthy_count: healthy,
                        desired_count: target.desired_count,
                        samples,
                    });
                }
            }

            self.clock.sleep(self.config.poll_interval).await;
        }
    }
}
