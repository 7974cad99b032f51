use rand::Rng;

use crate::clock::Clock;
use crate::cluster::{ClusterClient, HealthPredicate};
use crate::experiment::{Experiment, InjectionMode, Reporter};

/// The result of one smoke check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// The results of a smoke-test run, in the order the checks ran.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmokeReport {
    pub checks: Vec<Check>,
}

impl SmokeReport {
    pub fn record(&mut self, name: &str, passed: bool, detail: String) {
        if passed {
            tracing::info!(name, %detail, "check passed");
        } else {
            tracing::warn!(name, %detail, "check failed");
        }
        self.checks.push(Check {
            name: name.to_owned(),
            passed,
            detail,
        });
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Check that the workload exists and is fully healthy and, if
/// `self_heal` is set, that it recovers from losing an instance.
pub async fn run<C, K, R, P>(
    experiment: &Experiment<'_, C, K>,
    self_heal: bool,
    rng: &mut R,
    reporter: &mut P,
) -> SmokeReport
where
    C: ClusterClient + Sync,
    K: Clock + Sync,
    R: Rng,
    P: Reporter,
{
    let mut report = SmokeReport::default();
    let config = experiment.config();
    let client = experiment.client();

    let target = match experiment.resolve_target().await {
        Ok(target) => {
            report.record(
                "workload declared",
                true,
                format!(
                    "'{workload}' wants {desired} instances",
                    workload = config.workload,
                    desired = target.desired_count
                ),
            );
            target
        }
        Err(error) => {
            report.record("workload declared", false, error.to_string());
            return report;
        }
    };

    for (name, predicate) in [
        ("instances running", HealthPredicate::Running),
        ("instances ready", HealthPredicate::ReadyForTraffic),
    ] {
        match client.count_healthy(&target.selector, predicate).await {
            Ok(healthy) => report.record(
                name,
                healthy >= target.desired_count,
                format!("{healthy}/{desired}", desired = target.desired_count),
            ),
            Err(error) => report.record(name, false, error.to_string()),
        }
    }

    if self_heal {
        match experiment
            .run_round(1, InjectionMode::Single, rng, reporter)
            .await
        {
            Ok(round) => match &round.result {
                Ok(outcome) => report.record(
                    "self-healing",
                    outcome.recovered,
                    format!(
                        "{victims} replaced after {elapsed:.1}s",
                        victims = round
                            .event
                            .victims
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        elapsed = outcome.elapsed_seconds()
                    ),
                ),
                Err(error) => report.record("self-healing", false, error.to_string()),
            },
            Err(error) => report.record("self-healing", false, error.to_string()),
        }
    }

    report
}
