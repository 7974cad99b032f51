use std::time::Duration;

use chaoslib::cluster::{HealthPredicate, Selector};
use chaoslib::experiment::ExperimentConfig;
use chaoslib::injector::VictimSelection;
use chaoslib::observer::{ObserverConfig, DEFAULT_RETRY_BUDGET};
use chaoslib::util::parse_seconds;

/// Which workload to disrupt, and what counts as recovered.
#[derive(Clone, Debug, clap::Args)]
pub struct ExperimentArgs {
    /// Deployment whose declared replica count is the recovery target.
    #[clap(
        long = "deployment",
        default_value = "resilience-pilot",
        env = "DEPLOYMENT"
    )]
    pub deployment: String,

    /// Label selector for the deployment's pods.
    #[clap(
        long = "selector",
        short = 'l',
        default_value = "app=resilience-pilot",
        env = "SELECTOR"
    )]
    pub selector: String,

    /// Number of healthy pods which counts as recovered.  If unspecified,
    /// the deployment's declared replica count is used.
    #[clap(long = "replicas", env = "REPLICAS")]
    pub replicas: Option<u32>,

    /// Which signal counts a pod as healthy.
    #[clap(
        long = "predicate",
        value_enum,
        default_value = "ready",
        env = "PREDICATE"
    )]
    pub predicate: HealthPredicate,

    /// Seconds between two health queries.
    #[clap(
        long = "poll-interval",
        value_parser = |secs: &str| parse_seconds(secs),
        default_value = "1",
        env = "POLL_INTERVAL",
    )]
    pub poll_interval: Duration,

    /// Seconds to wait for recovery before calling it a timeout.
    #[clap(
        long = "timeout",
        value_parser = |secs: &str| parse_seconds(secs),
        default_value = "120",
        env = "RECOVERY_TIMEOUT",
    )]
    pub timeout: Duration,

    /// Maximum acceptable recovery time, in seconds, for a PASS.
    #[clap(
        long = "slo",
        value_parser = |secs: &str| parse_seconds(secs),
        default_value = "30",
        env = "SLO",
    )]
    pub slo: Duration,

    /// Consecutive failed health queries before giving up on a round.
    #[clap(
        long = "retry-budget",
        default_value_t = DEFAULT_RETRY_BUDGET,
        value_parser = clap::value_parser!(u32).range(1..),
        env = "RETRY_BUDGET"
    )]
    pub retry_budget: u32,
}

impl ExperimentArgs {
    pub fn into_config(self) -> ExperimentConfig {
        ExperimentConfig {
            workload: self.deployment,
            selector: Selector(self.selector),
            predicate: self.predicate,
            replicas: self.replicas,
            observer: ObserverConfig {
                poll_interval: self.poll_interval,
                timeout: self.timeout,
                retry_budget: self.retry_budget,
            },
            slo: self.slo,
        }
    }
}

#[derive(Clone, Debug, clap::Args)]
pub struct ContinuousArgs {
    /// Seconds to wait between the end of one round and the start of the
    /// next.
    #[clap(
        long = "interval",
        value_parser = |secs: &str| parse_seconds(secs),
        default_value = "30",
    )]
    pub interval: Duration,
}

#[derive(Clone, Debug, clap::Args)]
pub struct BatchArgs {
    /// Number of pods to kill simultaneously in each round.
    #[clap(long = "victims", short = 'k', default_value = "2")]
    pub victims: usize,

    /// Number of rounds.
    #[clap(long = "rounds", short = 'r', default_value = "3")]
    pub rounds: u64,

    /// Seconds to wait between rounds.
    #[clap(
        long = "interval",
        value_parser = |secs: &str| parse_seconds(secs),
        default_value = "10",
    )]
    pub interval: Duration,

    /// Pick a random subset of pods rather than the first ones by name.
    #[clap(long = "random")]
    pub random: bool,
}

impl BatchArgs {
    pub fn selection(&self) -> VictimSelection {
        if self.random {
            VictimSelection::Random
        } else {
            VictimSelection::Prefix
        }
    }
}

#[derive(Clone, Debug, clap::Args)]
pub struct SmokeArgs {
    /// URL of the service's health endpoint, to check over HTTP.
    #[clap(long = "health-url", value_parser, env = "HEALTH_URL")]
    pub health_url: Option<reqwest::Url>,

    /// Do not kill a pod to check that the workload heals.
    #[clap(long = "skip-self-heal")]
    pub skip_self_heal: bool,
}
