//! Scripted cluster and clock for tests.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::clock::Clock;
use crate::cluster::{ClusterClient, HealthPredicate, InstanceId, Selector};
use crate::error::Error;

/// A healthy-count query response: `None` means the query fails.
pub type Tick = Option<u32>;

/// An in-memory cluster.  `count_healthy` replays the scripted ticks in
/// order, then falls back to the number of live instances which are not
/// marked unhealthy.  Unhealthy instances fail every predicate.
#[derive(Debug, Default)]
pub struct MockCluster {
    pub ticks: Mutex<VecDeque<Tick>>,
    pub instances: Mutex<Vec<InstanceId>>,
    pub desired: Option<u32>,
    pub unkillable: HashSet<InstanceId>,
    pub unhealthy: HashSet<InstanceId>,
    pub terminated: Mutex<Vec<InstanceId>>,
    pub queries: Mutex<Vec<HealthPredicate>>,
}

impl MockCluster {
    pub fn new(desired: u32, instances: &[&str]) -> Self {
        Self {
            desired: Some(desired),
            instances: Mutex::new(instances.iter().map(|s| InstanceId::from(*s)).collect()),
            ..Default::default()
        }
    }

    pub fn with_ticks(self, ticks: &[Tick]) -> Self {
        *self.ticks.lock().unwrap() = ticks.iter().copied().collect();
        self
    }

    pub fn with_unkillable(mut self, name: &str) -> Self {
        self.unkillable.insert(InstanceId::from(name));
        self
    }

    pub fn with_unhealthy(mut self, name: &str) -> Self {
        self.unhealthy.insert(InstanceId::from(name));
        self
    }

    pub fn live(&self) -> u32 {
        self.healthy_instances().len() as u32
    }

    fn healthy_instances(&self) -> Vec<InstanceId> {
        self.instances
            .lock()
            .unwrap()
            .iter()
            .filter(|i| !self.unhealthy.contains(i))
            .cloned()
            .collect()
    }

    pub fn terminated(&self) -> Vec<InstanceId> {
        self.terminated.lock().unwrap().clone()
    }
}

pub fn connection_refused() -> Error {
    Error::Kube(kube::Error::Service(Box::new(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))))
}

impl ClusterClient for MockCluster {
    async fn terminate_instance(&self, id: &InstanceId) -> Result<(), Error> {
        if self.unkillable.contains(id) {
            return Err(Error::TargetNotFound(id.to_string()));
        }
        let mut instances = self.instances.lock().unwrap();
        match instances.iter().position(|i| i == id) {
            Some(idx) => {
                instances.remove(idx);
                self.terminated.lock().unwrap().push(id.clone());
                Ok(())
            }
            None => Err(Error::TargetNotFound(id.to_string())),
        }
    }

    async fn count_healthy(
        &self,
        _selector: &Selector,
        predicate: HealthPredicate,
    ) -> Result<u32, Error> {
        self.queries.lock().unwrap().push(predicate);
        let tick = self.ticks.lock().unwrap().pop_front();
        match tick {
            Some(Some(n)) => Ok(n),
            Some(None) => Err(connection_refused()),
            None => Ok(self.live()),
        }
    }

    async fn count_desired(&self, workload: &str) -> Result<u32, Error> {
        self.desired
            .ok_or_else(|| Error::TargetNotFound(workload.to_owned()))
    }

    async fn list_instances(
        &self,
        _selector: &Selector,
        predicate: HealthPredicate,
    ) -> Result<Vec<InstanceId>, Error> {
        self.queries.lock().unwrap().push(predicate);
        Ok(self.healthy_instances())
    }
}

/// A clock which only moves when something sleeps on it.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}
