use std::fmt;
use std::time::Duration;

use crate::cluster::InstanceId;

/// Generic error type
#[derive(Debug)]
pub enum Error {
    InferConfig(kube::config::InferConfigError),
    Injection(InjectionError),
    InvalidTarget(String),
    Kube(kube::Error),
    Kubeconfig(kube::config::KubeconfigError),
    Observation(ObservationError),
    TargetNotFound(String),
}

impl Error {
    /// Whether this error means we could not talk to (or observe) the
    /// cluster at all, as opposed to the cluster being in an unexpected
    /// state.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::InferConfig(_) | Self::Kube(_) | Self::Kubeconfig(_) | Self::Observation(_) => {
                true
            }
            Self::Injection(e) => e.cause.is_unreachable(),
            Self::InvalidTarget(_) | Self::TargetNotFound(_) => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InferConfig(s) => write!(f, "infer kubernetes config: {s}"),
            Self::Injection(s) => write!(f, "injection: {s}"),
            Self::InvalidTarget(s) => write!(f, "invalid target: {s}"),
            Self::Kube(s) => write!(f, "kubernetes: {s}"),
            Self::Kubeconfig(s) => write!(f, "kubeconfig: {s}"),
            Self::Observation(s) => write!(f, "observation: {s}"),
            Self::TargetNotFound(s) => write!(f, "target not found: {s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<kube::config::InferConfigError> for Error {
    fn from(error: kube::config::InferConfigError) -> Self {
        Self::InferConfig(error)
    }
}

impl From<InjectionError> for Error {
    fn from(error: InjectionError) -> Self {
        Self::Injection(error)
    }
}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        Self::Kube(error)
    }
}

impl From<kube::config::KubeconfigError> for Error {
    fn from(error: kube::config::KubeconfigError) -> Self {
        Self::Kubeconfig(error)
    }
}

impl From<ObservationError> for Error {
    fn from(error: ObservationError) -> Self {
        Self::Observation(error)
    }
}

/// A termination request which was not acknowledged.
#[derive(Debug)]
pub struct InjectionError {
    pub victim: InstanceId,
    pub cause: Box<Error>,
}

impl fmt::Display for InjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not terminate '{victim}': {cause}",
            victim = self.victim,
            cause = self.cause
        )
    }
}

/// The health signal could not be read: distinct from "the workload did not
/// recover".
#[derive(Debug)]
pub struct ObservationError {
    /// Number of consecutive failed queries when we gave up.
    pub failures: u32,
    /// The most recent successful healthy-count sample, if there was one.
    pub last_sample: Option<u32>,
    /// Time since the observation started.
    pub elapsed: Duration,
    pub cause: Box<Error>,
}

impl fmt::Display for ObservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_sample = match self.last_sample {
            Some(n) => n.to_string(),
            None => "none".to_owned(),
        };
        write!(
            f,
            "gave up after {failures} failed queries ({elapsed:.1}s elapsed, last sample: {last_sample}): {cause}",
            failures = self.failures,
            elapsed = self.elapsed.as_secs_f64(),
            cause = self.cause
        )
    }
}
