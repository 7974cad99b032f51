use futures::future::join_all;
use rand::prelude::SliceRandom;
use rand::Rng;
use std::time::SystemTime;

use crate::cluster::{ClusterClient, HealthPredicate, InstanceId, Selector};
use crate::error::{Error, InjectionError};

/// Maximum number of different victims to try in single-victim mode before
/// giving up.
pub static MAXIMUM_VICTIM_ATTEMPTS: usize = 3;

/// How to pick the victims of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VictimSelection {
    /// The first `k` instances, in name order.
    #[default]
    Prefix,
    /// A uniformly random subset of size `k`.
    Random,
}

/// One induced failure.
#[derive(Debug)]
pub struct ChaosEvent {
    /// Instances whose termination was acknowledged.
    pub victims: Vec<InstanceId>,
    /// Instances we tried and failed to terminate.
    pub failures: Vec<InjectionError>,
    /// When the last termination was acknowledged.
    pub injected_at: SystemTime,
}

/// Forcibly terminates instances matching a selector.
#[derive(Debug)]
pub struct ChaosInjector<'a, C> {
    client: &'a C,
}

impl<'a, C: ClusterClient + Sync> ChaosInjector<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Terminate one random instance satisfying `predicate`.  If that
    /// fails, try a different one, up to `MAXIMUM_VICTIM_ATTEMPTS` times.
    pub async fn inject_one<R: Rng>(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
        rng: &mut R,
    ) -> Result<ChaosEvent, Error> {
        let mut candidates = self.candidates(selector, predicate).await?;
        let mut failures = Vec::new();

        while failures.len() < MAXIMUM_VICTIM_ATTEMPTS && !candidates.is_empty() {
            let victim = candidates.swap_remove(rng.gen_range(0..candidates.len()));

            tracing::info!(%selector, %victim, "terminating instance");
            match self.client.terminate_instance(&victim).await {
                Ok(()) => {
                    return Ok(ChaosEvent {
                        victims: vec![victim],
                        failures,
                        injected_at: SystemTime::now(),
                    })
                }
                Err(error) => {
                    tracing::warn!(%selector, %victim, ?error, "could not terminate instance, trying another...");
                    failures.push(InjectionError {
                        victim,
                        cause: Box::new(error),
                    });
                }
            }
        }

        match failures.pop() {
            Some(error) => Err(error.into()),
            None => Err(Error::TargetNotFound(selector.to_string())),
        }
    }

    /// Terminate `count` instances at once, waiting for every termination to
    /// be acknowledged.  Individual failures are recorded in the event; only
    /// if every termination fails is this an error.
    pub async fn inject_batch<R: Rng>(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
        count: usize,
        selection: VictimSelection,
        rng: &mut R,
    ) -> Result<ChaosEvent, Error> {
        if count == 0 {
            return Err(Error::InvalidTarget(
                "batch size must be at least 1".to_owned(),
            ));
        }

        let candidates = self.candidates(selector, predicate).await?;
        if count > candidates.len() {
            tracing::warn!(%selector, requested = count, available = candidates.len(), "not enough instances, terminating all of them");
        }

        let chosen: Vec<InstanceId> = match selection {
            VictimSelection::Prefix => candidates.into_iter().take(count).collect(),
            VictimSelection::Random => candidates.choose_multiple(rng, count).cloned().collect(),
        };

        tracing::info!(%selector, count = chosen.len(), "terminating batch");
        let results = join_all(chosen.iter().map(|victim| self.client.terminate_instance(victim))).await;

        let mut victims = Vec::with_capacity(chosen.len());
        let mut failures = Vec::new();
        for (victim, result) in chosen.into_iter().zip(results) {
            match result {
                Ok(()) => victims.push(victim),
                Err(error) => {
                    tracing::warn!(%selector, %victim, ?error, "could not terminate instance");
                    failures.push(InjectionError {
                        victim,
                        cause: Box::new(error),
                    });
                }
            }
        }

        if victims.is_empty() {
            if let Some(error) = failures.pop() {
                return Err(error.into());
            }
        }

        Ok(ChaosEvent {
            victims,
            failures,
            injected_at: SystemTime::now(),
        })
    }

    /// The sorted list of instances which could be terminated.  Only
    /// healthy instances qualify: killing anything else would not lower the
    /// healthy count.
    async fn candidates(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
    ) -> Result<Vec<InstanceId>, Error> {
        let mut candidates = self.client.list_instances(selector, predicate).await?;
        if candidates.is_empty() {
            return Err(Error::TargetNotFound(format!(
                "no {predicate} instances match '{selector}'"
            )));
        }
        candidates.sort();

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCluster;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    static READY: HealthPredicate = HealthPredicate::ReadyForTraffic;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[tokio::test]
    async fn single_victim_is_one_of_the_candidates() {
        let cluster = MockCluster::new(3, &["a", "b", "c"]);
        let injector = ChaosInjector::new(&cluster);

        let event = injector
            .inject_one(&Selector::from("app=pilot"), READY, &mut rng())
            .await
            .unwrap();

        assert_eq!(event.victims.len(), 1);
        assert!(event.failures.is_empty());
        assert_eq!(cluster.terminated(), event.victims);
        assert_eq!(cluster.live(), 2);
    }

    #[tokio::test]
    async fn single_victim_retries_another_instance() {
        // whichever is picked first, "b" must end up terminated
        for seed in 0..8 {
            let cluster = MockCluster::new(2, &["a", "b"]).with_unkillable("a");
            let injector = ChaosInjector::new(&cluster);
            let event = injector
                .inject_one(&Selector::from("app=pilot"), READY, &mut StdRng::seed_from_u64(seed))
                .await
                .unwrap();
            assert_eq!(event.victims, vec![InstanceId::from("b")]);
            assert!(event.failures.len() <= 1);
        }
    }

    #[tokio::test]
    async fn single_victim_gives_up_when_nothing_can_be_killed() {
        let cluster = MockCluster::new(1, &["a"]).with_unkillable("a");
        let injector = ChaosInjector::new(&cluster);

        let res = injector
            .inject_one(&Selector::from("app=pilot"), READY, &mut rng())
            .await;
        match res {
            Err(Error::Injection(e)) => assert_eq!(e.victim, InstanceId::from("a")),
            other => panic!("expected injection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_instances_is_target_not_found() {
        let cluster = MockCluster::new(1, &[]);
        let injector = ChaosInjector::new(&cluster);

        let res = injector
            .inject_one(&Selector::from("app=pilot"), READY, &mut rng())
            .await;
        assert!(matches!(res, Err(Error::TargetNotFound(_))));
    }

    #[tokio::test]
    async fn unhealthy_instances_are_never_victims() {
        for seed in 0..16 {
            let cluster = MockCluster::new(3, &["a", "b", "c"])
                .with_unhealthy("a")
                .with_unhealthy("c");
            let injector = ChaosInjector::new(&cluster);
            let event = injector
                .inject_one(&Selector::from("app=pilot"), READY, &mut StdRng::seed_from_u64(seed))
                .await
                .unwrap();
            assert_eq!(event.victims, vec![InstanceId::from("b")]);
        }
    }

    #[tokio::test]
    async fn candidates_are_listed_with_the_rounds_predicate() {
        let cluster = MockCluster::new(1, &["a"]);
        let injector = ChaosInjector::new(&cluster);

        injector
            .inject_one(&Selector::from("app=pilot"), HealthPredicate::Scheduled, &mut rng())
            .await
            .unwrap();
        assert_eq!(
            *cluster.queries.lock().unwrap(),
            vec![HealthPredicate::Scheduled]
        );
    }

    #[tokio::test]
    async fn nothing_healthy_is_target_not_found() {
        let cluster = MockCluster::new(2, &["a", "b"])
            .with_unhealthy("a")
            .with_unhealthy("b");
        let injector = ChaosInjector::new(&cluster);

        let res = injector
            .inject_batch(&Selector::from("app=pilot"), READY, 1, VictimSelection::Random, &mut rng())
            .await;
        assert!(matches!(res, Err(Error::TargetNotFound(_))));
        assert!(cluster.terminated().is_empty());
    }

    #[tokio::test]
    async fn batch_skips_unhealthy_instances() {
        let cluster = MockCluster::new(4, &["a", "b", "c", "d"]).with_unhealthy("b");
        let injector = ChaosInjector::new(&cluster);
        let selector = Selector::from("app=pilot");

        let before = cluster.count_healthy(&selector, READY).await.unwrap();
        let event = injector
            .inject_batch(&selector, READY, 2, VictimSelection::Prefix, &mut rng())
            .await
            .unwrap();
        let after = cluster.count_healthy(&selector, READY).await.unwrap();

        assert_eq!(event.victims, vec![InstanceId::from("a"), InstanceId::from("c")]);
        assert_eq!(before - after, 2);
    }

    #[tokio::test]
    async fn batch_reduces_healthy_count_by_k() {
        let cluster = MockCluster::new(5, &["a", "b", "c", "d", "e"]);
        let injector = ChaosInjector::new(&cluster);
        let selector = Selector::from("app=pilot");

        let before = cluster
            .count_healthy(&selector, HealthPredicate::ReadyForTraffic)
            .await
            .unwrap();
        let event = injector
            .inject_batch(&selector, READY, 3, VictimSelection::Random, &mut rng())
            .await
            .unwrap();
        let after = cluster
            .count_healthy(&selector, HealthPredicate::ReadyForTraffic)
            .await
            .unwrap();

        assert_eq!(event.victims.len(), 3);
        assert_eq!(before - after, 3);
    }

    #[tokio::test]
    async fn prefix_batch_takes_first_names() {
        let cluster = MockCluster::new(3, &["c", "a", "b"]);
        let injector = ChaosInjector::new(&cluster);

        let event = injector
            .inject_batch(&Selector::from("app=pilot"), READY, 2, VictimSelection::Prefix, &mut rng())
            .await
            .unwrap();
        assert_eq!(event.victims, vec![InstanceId::from("a"), InstanceId::from("b")]);
    }

    #[tokio::test]
    async fn batch_reports_per_victim_failures() {
        let cluster = MockCluster::new(3, &["a", "b", "c"]).with_unkillable("b");
        let injector = ChaosInjector::new(&cluster);

        let event = injector
            .inject_batch(&Selector::from("app=pilot"), READY, 3, VictimSelection::Prefix, &mut rng())
            .await
            .unwrap();
        assert_eq!(event.victims, vec![InstanceId::from("a"), InstanceId::from("c")]);
        assert_eq!(event.failures.len(), 1);
        assert_eq!(event.failures[0].victim, InstanceId::from("b"));
    }

    #[tokio::test]
    async fn batch_larger_than_workload_kills_everything() {
        let cluster = MockCluster::new(2, &["a", "b"]);
        let injector = ChaosInjector::new(&cluster);

        let event = injector
            .inject_batch(&Selector::from("app=pilot"), READY, 10, VictimSelection::Random, &mut rng())
            .await
            .unwrap();
        assert_eq!(event.victims.len(), 2);
        assert_eq!(cluster.live(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let cluster = MockCluster::new(2, &["a", "b"]);
        let injector = ChaosInjector::new(&cluster);

        let res = injector
            .inject_batch(&Selector::from("app=pilot"), READY, 0, VictimSelection::Random, &mut rng())
            .await;
        assert!(matches!(res, Err(Error::InvalidTarget(_))));
    }
}
