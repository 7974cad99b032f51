use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::cluster::{ClusterClient, HealthPredicate, Selector};
use crate::error::{Error, ObservationError};
use crate::injector::{ChaosEvent, ChaosInjector, VictimSelection};
use crate::observer::{ObserverConfig, RecoveryObserver, RecoveryOutcome, RecoveryTarget, Sample};
use crate::util;

/// Default bound on MTTR for a passing round.
pub static DEFAULT_SLO: Duration = Duration::from_secs(30);

/// What to inject in each round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectionMode {
    /// Kill one random instance.
    Single,
    /// Kill `victims` instances simultaneously.
    Batch {
        victims: usize,
        selection: VictimSelection,
    },
}

/// Everything needed to run rounds against one workload.
#[derive(Clone, Debug)]
pub struct ExperimentConfig {
    /// The deployment whose declared replica count is the recovery target.
    pub workload: String,
    /// Selects the deployment's instances.
    pub selector: Selector,
    pub predicate: HealthPredicate,
    /// Overrides the declared replica count.
    pub replicas: Option<u32>,
    pub observer: ObserverConfig,
    pub slo: Duration,
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !util::is_valid_dns_label(&self.workload) {
            return Err(Error::InvalidTarget(format!(
                "'{workload}' is not a valid workload name",
                workload = self.workload
            )));
        }
        if self.selector.0.trim().is_empty() {
            return Err(Error::InvalidTarget(
                "the selector must not be empty".to_owned(),
            ));
        }
        if self.replicas == Some(0) {
            return Err(Error::InvalidTarget(
                "the replica count must be at least 1".to_owned(),
            ));
        }
        if self.observer.poll_interval.is_zero() {
            return Err(Error::InvalidTarget(
                "the poll interval must be at least 1 second".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Did a round meet the SLO?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// The complete record of one round: what was killed and what happened
/// next.
#[derive(Debug)]
pub struct RoundReport {
    pub round: u64,
    pub target: RecoveryTarget,
    pub event: ChaosEvent,
    /// `Err` if the cluster could not be observed.
    pub result: Result<RecoveryOutcome, ObservationError>,
    pub slo: Duration,
}

impl RoundReport {
    pub fn verdict(&self) -> Verdict {
        match &self.result {
            Ok(outcome) if outcome.recovered && outcome.elapsed <= self.slo => Verdict::Pass,
            _ => Verdict::Fail,
        }
    }
}

/// Aggregate results over a run of rounds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: u64,
    pub recovered: u64,
    pub timed_out: u64,
    /// Rounds where the cluster could not be observed or reached.
    pub unreachable: u64,
    /// Rounds which could not run at all, for any other reason.
    pub aborted: u64,
    pub passed: u64,
    pub failed: u64,
    pub total_recovery: Duration,
    pub max_recovery: Duration,
}

impl RunSummary {
    pub fn record(&mut self, report: &RoundReport) {
        self.rounds += 1;
        match &report.result {
            Ok(outcome) if outcome.recovered => {
                self.recovered += 1;
                self.total_recovery += outcome.elapsed;
                self.max_recovery = self.max_recovery.max(outcome.elapsed);
            }
            Ok(_) => self.timed_out += 1,
            Err(_) => self.unreachable += 1,
        }
        match report.verdict() {
            Verdict::Pass => self.passed += 1,
            Verdict::Fail => self.failed += 1,
        }
    }

    pub fn record_error(&mut self, error: &Error) {
        self.rounds += 1;
        self.failed += 1;
        if error.is_unreachable() {
            self.unreachable += 1;
        } else {
            self.aborted += 1;
        }
    }

    /// Mean time to recovery over the rounds which did recover.
    pub fn mean_recovery(&self) -> Option<Duration> {
        u32::try_from(self.recovered)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total_recovery / n)
    }
}

/// Trait for things which want to follow an experiment as it runs.
pub trait Reporter {
    fn round_started(&mut self, round: u64);
    fn injected(&mut self, event: &ChaosEvent, target: &RecoveryTarget);
    fn sample(&mut self, sample: &Sample);
    fn round_finished(&mut self, report: &RoundReport);
    fn round_failed(&mut self, round: u64, error: &Error);
}

/// Runs chaos rounds against one workload: inject, then observe.  Rounds
/// never overlap.
#[derive(Debug)]
pub struct Experiment<'a, C, K> {
    client: &'a C,
    clock: &'a K,
    config: ExperimentConfig,
}

impl<'a, C: ClusterClient + Sync, K: Clock + Sync> Experiment<'a, C, K> {
    pub fn new(client: &'a C, clock: &'a K, config: ExperimentConfig) -> Self {
        Self {
            client,
            clock,
            config,
        }
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Work out how many healthy instances count as recovered, before
    /// anything is injected.
    pub async fn resolve_target(&self) -> Result<RecoveryTarget, Error> {
        let selector = self.config.selector.clone();
        match self.config.replicas {
            Some(desired) => RecoveryTarget::new(selector, desired, self.config.predicate),
            None => {
                RecoveryTarget::from_workload(
                    self.client,
                    &self.config.workload,
                    selector,
                    self.config.predicate,
                )
                .await
            }
        }
    }

    /// Run a single round.  Observation failures are part of the report;
    /// anything which stops the round from happening at all is an error.
    pub async fn run_round<R: Rng, P: Reporter>(
        &self,
        round: u64,
        mode: InjectionMode,
        rng: &mut R,
        reporter: &mut P,
    ) -> Result<RoundReport, Error> {
        reporter.round_started(round);

        let target = self.resolve_target().await?;
        let injector = ChaosInjector::new(self.client);
        let event = match mode {
            InjectionMode::Single => injector.inject_one(&target.selector, target.predicate, rng).await?,
            InjectionMode::Batch { victims, selection } => {
                injector
                    .inject_batch(&target.selector, target.predicate, victims, selection, rng)
                    .await?
            }
        };
        reporter.injected(&event, &target);

        // the clock starts only now, after every termination is acknowledged
        let observer = RecoveryObserver::new(self.client, self.clock, self.config.observer);
        let result = match observer.observe(&target, |s| reporter.sample(s)).await {
            Ok(outcome) => Ok(outcome),
            Err(Error::Observation(error)) => Err(error),
            Err(error) => return Err(error),
        };

        let report = RoundReport {
            round,
            target,
            event,
            result,
            slo: self.config.slo,
        };
        reporter.round_finished(&report);

        Ok(report)
    }

    /// Run `rounds` rounds, waiting `interval` between them.
    pub async fn run_rounds<R: Rng, P: Reporter>(
        &self,
        rounds: u64,
        interval: Duration,
        mode: InjectionMode,
        rng: &mut R,
        shutdown: &mut watch::Receiver<bool>,
        reporter: &mut P,
    ) -> RunSummary {
        self.run_loop(Some(rounds), interval, mode, rng, shutdown, reporter)
            .await
    }

    /// Run rounds until `shutdown` becomes `true`.  An in-flight round is
    /// always allowed to finish.
    pub async fn run_continuous<R: Rng, P: Reporter>(
        &self,
        interval: Duration,
        mode: InjectionMode,
        rng: &mut R,
        shutdown: &mut watch::Receiver<bool>,
        reporter: &mut P,
    ) -> RunSummary {
        self.run_loop(None, interval, mode, rng, shutdown, reporter)
            .await
    }

    async fn run_loop<R: Rng, P: Reporter>(
        &self,
        limit: Option<u64>,
        interval: Duration,
        mode: InjectionMode,
        rng: &mut R,
        shutdown: &mut watch::Receiver<bool>,
        reporter: &mut P,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut round = 0;

        loop {
            if *shutdown.borrow() {
                tracing::info!(round, "interrupted, not starting another round");
                break;
            }

            round += 1;
            match self.run_round(round, mode, rng, reporter).await {
                Ok(report) => summary.record(&report),
                Err(error) => {
                    tracing::error!(round, ?error, "round failed, skipping...");
                    reporter.round_failed(round, &error);
                    summary.record_error(&error);
                }
            }

            if limit.is_some_and(|limit| round >= limit) {
                break;
            }

            tokio::select! {
                () = self.clock.sleep(interval) => (),
                () = interrupted(shutdown) => {
                    tracing::info!(round, "interrupted, not starting another round");
                    break;
                }
            }
        }

        summary
    }
}

/// Resolves once the shutdown flag is set.  Never resolves if nobody is
/// left to set it.
async fn interrupted(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// A reporter which ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn round_started(&mut self, _round: u64) {}
    fn injected(&mut self, _event: &ChaosEvent, _target: &RecoveryTarget) {}
    fn sample(&mut self, _sample: &Sample) {}
    fn round_finished(&mut self, _report: &RoundReport) {}
    fn round_failed(&mut self, _round: u64, _error: &Error) {}
}
