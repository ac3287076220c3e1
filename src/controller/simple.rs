//! Simple controller implementation
//!
//! This module implements the reconciliation logic for Simple resources.
//! Every pass re-reads the Simple, its Deployment and its pods, and performs at
//! most one corrective step:
//!
//! 1. Simple gone -> nothing to do (owned objects are garbage-collected)
//! 2. Deployment missing -> create it, requeue immediately
//! 3. Replica count drifted -> resize, requeue after a grace period
//! 4. Pod names drifted from `status.nodes` -> rewrite status
//!
//! No phase is stored anywhere. The position in that sequence is recomputed
//! from observed state on every pass, so a pass interrupted half-way is simply
//! resumed by the next one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

use crate::config::ReconcilerConfig;
use crate::crd::Simple;
use crate::workload::{
    deployment_for_simple, label_selector, labels_for_simple, pod_names, replicas_of,
    set_owner_reference,
};
use crate::Error;

/// Field manager used for status writes
const FIELD_MANAGER: &str = "simple-operator";

/// Trait abstracting the cluster store the reconciler reads and writes
///
/// Lookups fold "not found" into `Ok(None)`; every other failure is returned
/// as an error. This allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a Simple by namespace and name
    async fn get_simple(&self, namespace: &str, name: &str) -> Result<Option<Simple>, Error>;

    /// Fetch a Deployment by namespace and name
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error>;

    /// Create a Deployment
    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Replace a Deployment, failing with a conflict if it changed since it was read
    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Write the status subresource of a Simple
    async fn update_simple_status(&self, simple: &Simple) -> Result<(), Error>;

    /// List pods in a namespace matching all of the given labels
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_simple(&self, namespace: &str, name: &str) -> Result<Option<Simple>, Error> {
        let api: Api<Simple> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let namespace = deployment
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&PostParams::default(), deployment).await?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let namespace = deployment
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&deployment.name_any(), &PostParams::default(), deployment)
            .await?;
        Ok(())
    }

    async fn update_simple_status(&self, simple: &Simple) -> Result<(), Error> {
        let namespace = simple
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<Simple> = Api::namespaced(self.client.clone(), &namespace);

        let mut status_patch = serde_json::json!({ "status": simple.status });
        // resourceVersion turns the merge patch into a conditional write
        if let Some(rv) = simple.resource_version() {
            status_patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch_status(&simple.name_any(), &params, &Patch::Merge(&status_patch))
            .await?;

        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await?.items)
    }
}

/// What the reconciler asks of its caller after a successful pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Converged; wait for the next watch event
    None,
    /// Run another pass right away
    Now,
    /// Run another pass after the given delay
    After(Duration),
}

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Self {
        match requeue {
            Requeue::None => Action::await_change(),
            Requeue::Now => Action::requeue(Duration::ZERO),
            Requeue::After(delay) => Action::requeue(delay),
        }
    }
}

/// Identity of the Simple a reconcile request is about
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Namespace of the Simple
    pub namespace: String,
    /// Name of the Simple
    pub name: String,
}

impl ResourceKey {
    /// Create a key from a namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Extract the key of a Simple delivered by the watcher
    pub fn from_object(simple: &Simple) -> Result<Self, Error> {
        let name = simple
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let namespace = simple
            .metadata
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Controller context containing shared clients and configuration
///
/// Holds no per-object state; everything the reconciler decides on is read
/// fresh from the cluster on each pass.
pub struct Context {
    /// Cluster store (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Reconciler tunables
    pub config: ReconcilerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context over an arbitrary store implementation
    pub fn with_store(kube: Arc<dyn KubeClient>, config: ReconcilerConfig) -> Self {
        Self { kube, config }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(ReconcilerConfig::default())
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    config: ReconcilerConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the reconciler configuration
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: Arc::new(KubeClientImpl::new(self.client)),
            config: self.config,
        }
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Replica count to write, or `None` if the Deployment already matches
pub fn plan_size(simple: &Simple, deployment: &Deployment) -> Option<i32> {
    let desired = simple.spec.size;
    (replicas_of(deployment) != desired).then_some(desired)
}

/// New `status.nodes`, or `None` if the recorded names already match
///
/// Pod names form a set; listing order is not stable across API calls, so the
/// comparison ignores order and duplicates, and the written value is sorted.
pub fn plan_nodes(recorded: &[String], observed: Vec<String>) -> Option<Vec<String>> {
    let observed: BTreeSet<String> = observed.into_iter().collect();
    let recorded_set: BTreeSet<&String> = recorded.iter().collect();
    let observed_set: BTreeSet<&String> = observed.iter().collect();

    // Length is taken before dedup so a recorded list with repeats is rewritten
    if recorded.len() == observed.len() && recorded_set == observed_set {
        None
    } else {
        Some(observed.into_iter().collect())
    }
}

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile a Simple resource delivered by the kube-rs controller
///
/// The delivered object only identifies the resource; the Simple itself is
/// re-read from the API server so decisions never rest on a stale copy.
pub async fn reconcile(simple: Arc<Simple>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = ResourceKey::from_object(&simple)?;
    reconcile_key(&key, &ctx).await.map(Action::from)
}

/// Run one reconcile pass for the Simple identified by `key`
///
/// # Returns
///
/// - `Requeue::None` when the Simple is gone or everything has converged
/// - `Requeue::Now` after creating the Deployment
/// - `Requeue::After(resize_requeue)` after resizing the Deployment
///
/// Any store failure other than not-found is returned unchanged so the caller
/// can choose the retry cadence.
#[instrument(skip_all, fields(simple = %key))]
pub async fn reconcile_key(key: &ResourceKey, ctx: &Context) -> Result<Requeue, Error> {
    let Some(simple) = ctx
        .kube
        .get_simple(&key.namespace, &key.name)
        .await
        .inspect_err(|e| error!(error = %e, "failed to get Simple"))?
    else {
        info!("Simple not found, ignoring since object must be deleted");
        return Ok(Requeue::None);
    };

    let deployment = match ctx
        .kube
        .get_deployment(&key.namespace, &key.name)
        .await
        .inspect_err(|e| error!(error = %e, "failed to get Deployment"))?
    {
        Some(deployment) => deployment,
        None => {
            create_deployment(&simple, ctx).await?;
            return Ok(Requeue::Now);
        }
    };

    if let Some(replicas) = plan_size(&simple, &deployment) {
        resize_deployment(deployment, replicas, ctx).await?;
        return Ok(Requeue::After(ctx.config.resize_requeue));
    }

    let pods = ctx
        .kube
        .list_pods(&key.namespace, &labels_for_simple(&key.name))
        .await
        .inspect_err(|e| error!(error = %e, "failed to list pods"))?;

    match plan_nodes(simple.nodes(), pod_names(&pods)) {
        Some(nodes) => {
            info!(count = nodes.len(), "updating Simple status with pod names");
            let mut updated = simple;
            updated.status.get_or_insert_with(Default::default).nodes = nodes;
            ctx.kube
                .update_simple_status(&updated)
                .await
                .inspect_err(|e| error!(error = %e, "failed to update Simple status"))?;
        }
        None => debug!("status already reflects pods"),
    }

    Ok(Requeue::None)
}

async fn create_deployment(simple: &Simple, ctx: &Context) -> Result<(), Error> {
    let mut deployment = deployment_for_simple(simple, &ctx.config.template)?;
    set_owner_reference(simple, &mut deployment.metadata)?;

    info!(replicas = simple.spec.size, "creating Deployment");
    ctx.kube
        .create_deployment(&deployment)
        .await
        .inspect_err(|e| error!(error = %e, "failed to create Deployment"))
}

async fn resize_deployment(
    mut deployment: Deployment,
    replicas: i32,
    ctx: &Context,
) -> Result<(), Error> {
    info!(
        from = replicas_of(&deployment),
        to = replicas,
        "resizing Deployment"
    );
    deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
    ctx.kube
        .update_deployment(&deployment)
        .await
        .inspect_err(|e| error!(error = %e, "failed to update Deployment"))
}

/// Error policy for the controller
///
/// Called by kube-rs when [`reconcile`] fails. Conflicts are retried quickly
/// since the next pass re-reads fresh state; everything else waits
/// `error_requeue`.
pub fn error_policy(simple: Arc<Simple>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        simple = %simple.name_any(),
        "reconciliation failed"
    );

    if error.is_conflict() {
        Action::requeue(ctx.config.conflict_requeue)
    } else {
        Action::requeue(ctx.config.error_requeue)
    }
}
