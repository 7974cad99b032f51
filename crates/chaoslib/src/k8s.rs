use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::KubeConfigOptions;
use std::time::Duration;

use crate::cluster::{ClusterClient, HealthPredicate, InstanceId, Selector};
use crate::error::Error;
use crate::util;

#[derive(Clone, Debug, clap::Args)]
pub struct Config {
    /// Namespace the workload lives in.
    #[clap(
        long = "namespace",
        short = 'n',
        default_value = "default",
        env = "NAMESPACE"
    )]
    pub namespace: String,

    /// kubeconfig context to use.  If unspecified, the configuration is
    /// inferred: in-cluster if running in a pod, the current context
    /// otherwise.
    #[clap(long = "context", env = "KUBE_CONTEXT")]
    pub context: Option<String>,

    /// Timeout (in seconds) for connecting to and reading from the API
    /// server.
    #[clap(
        id = "kube_timeout",
        long = "kube-timeout",
        value_parser = |secs: &str| util::parse_seconds(secs),
        default_value = "5",
        env = "KUBE_TIMEOUT",
    )]
    pub timeout: Duration,
}

impl Config {
    /// Build a client for the configured cluster.
    pub async fn connect(&self) -> Result<KubeClusterClient, Error> {
        let mut client_config = match &self.context {
            Some(context) => {
                kube::Config::from_kubeconfig(&KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                })
                .await?
            }
            None => kube::Config::infer().await?,
        };
        client_config.connect_timeout = Some(self.timeout);
        client_config.read_timeout = Some(self.timeout);

        let client = kube::Client::try_from(client_config)?;
        tracing::info!(namespace = %self.namespace, context = ?self.context, "connected to cluster");

        Ok(KubeClusterClient {
            client,
            namespace: self.namespace.clone(),
        })
    }
}

/// A `ClusterClient` backed by the Kubernetes API: instances are pods,
/// workloads are deployments.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: kube::Client,
    namespace: String,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client, namespace: String) -> Self {
        Self { client, namespace }
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Pods matching the selector which are not being deleted.
    async fn live_pods(&self, selector: &Selector) -> Result<Vec<Pod>, Error> {
        let pods = self
            .pods()
            .list(&ListParams::default().labels(&selector.0))
            .await?;

        Ok(pods.items.into_iter().filter(|p| !is_terminating(p)).collect())
    }
}

impl ClusterClient for KubeClusterClient {
    async fn terminate_instance(&self, id: &InstanceId) -> Result<(), Error> {
        let dp = DeleteParams {
            grace_period_seconds: Some(0),
            ..Default::default()
        };

        match self.pods().delete(&id.0, &dp).await {
            Ok(_) => {
                tracing::info!(namespace = %self.namespace, pod = %id, "deleted pod");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::TargetNotFound(format!(
                "pod '{id}' is already gone"
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn count_healthy(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
    ) -> Result<u32, Error> {
        let pods = self.live_pods(selector).await?;
        let healthy = pods.iter().filter(|p| satisfies(p, predicate)).count();

        Ok(u32::try_from(healthy).unwrap_or(u32::MAX))
    }

    async fn count_desired(&self, workload: &str) -> Result<u32, Error> {
        match self.deployments().get(workload).await {
            Ok(deployment) => {
                // an unset replica count means 1
                let replicas = deployment.spec.and_then(|s| s.replicas).unwrap_or(1);
                Ok(u32::try_from(replicas).unwrap_or(0))
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::TargetNotFound(format!(
                "deployment '{workload}' does not exist in namespace '{namespace}'",
                namespace = self.namespace
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn list_instances(
        &self,
        selector: &Selector,
        predicate: HealthPredicate,
    ) -> Result<Vec<InstanceId>, Error> {
        let mut ids: Vec<InstanceId> = self
            .live_pods(selector)
            .await?
            .into_iter()
            .filter(|p| satisfies(p, predicate))
            .filter_map(|p| p.metadata.name.map(InstanceId))
            .collect();
        ids.sort();

        Ok(ids)
    }
}

///////////////////////////////////////////////////////////////////////////////

/// A pod with a deletion timestamp is on its way out, whatever its status
/// says.
pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Check a pod against a health predicate.
pub fn satisfies(pod: &Pod, predicate: HealthPredicate) -> bool {
    if is_terminating(pod) {
        return false;
    }

    match predicate {
        HealthPredicate::Scheduled => {
            pod.spec
                .as_ref()
                .and_then(|s| s.node_name.as_ref())
                .is_some_and(|n| !n.is_empty())
                || has_condition(pod, "PodScheduled")
        }
        HealthPredicate::Running => phase(pod) == Some("Running"),
        HealthPredicate::ReadyForTraffic => {
            phase(pod) == Some("Running") && has_condition(pod, "Ready")
        }
    }
}

fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

/// Whether the pod has the given condition with status `True`.
fn has_condition(pod: &Pod, condition_type: &str) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|cs| {
            cs.iter()
                .any(|c| c.type_ == condition_type && c.status == "True")
        })
}
