use std::fmt;
use std::future::Future;

use crate::error::Error;

/// Which signal counts an instance as healthy.
///
/// A pod can be `Running` (its process has started) long before it passes
/// its readiness check and receives traffic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum HealthPredicate {
    /// Assigned to a node.
    Scheduled,
    /// In the `Running` phase.
    Running,
    /// Running and passing its readiness check.
    #[default]
    #[value(name = "ready")]
    ReadyForTraffic,
}

impl fmt::Display for HealthPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::ReadyForTraffic => write!(f, "ready"),
        }
    }
}

/// Wrapper for label selectors, to disambiguate them from workload names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector(pub String);

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wrapper for instance (pod) names.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub String);

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for things which can inspect and disrupt the workloads of a
/// cluster.  The cluster itself is responsible for healing: nothing here
/// reschedules anything.
pub trait ClusterClient {
    /// Terminate an instance immediately, with no graceful shutdown period.
    /// Resolves once the request has been acknowledged.
    fn terminate_instance(
        &self,
        id: &InstanceId,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Count the instances matching `selector` which satisfy `predicate`.
    fn count_healthy(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
    ) -> impl Future<Output = Result<u32, Error>> + Send;

    /// The declared replica count of a workload.
    fn count_desired(&self, workload: &str) -> impl Future<Output = Result<u32, Error>> + Send;

    /// The instances matching `selector` which satisfy `predicate`, and so
    /// count towards the healthy total.
    fn list_instances(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
    ) -> impl Future<Output = Result<Vec<InstanceId>, Error>> + Send;
}
