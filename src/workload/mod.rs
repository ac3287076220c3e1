//! Managed workload construction
//!
//! Builds the Deployment that backs a [`Simple`] and the label selector that
//! joins the Deployment to its pods. Naming and labels must match exactly what
//! the Deployment controller and the pod listing expect:
//! - Deployment name/namespace = Simple name/namespace
//! - labels = `{app: "simple", simple_cr: <name>}`

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};

use crate::crd::Simple;
use crate::Error;

/// Value of the `app` label on every managed Deployment and pod
pub const APP_LABEL_VALUE: &str = "simple";

/// Label key carrying the owning Simple's name
pub const CR_LABEL_KEY: &str = "simple_cr";

/// Container name inside the pod template
pub const CONTAINER_NAME: &str = "simple";

/// Default simple-service image
pub const DEFAULT_IMAGE: &str = "biandayu/simple-service:v1.2.1";

/// Default upstream the service proxies to
pub const DEFAULT_UPSTREAM: &str = "https://www.thecocktaildb.com/";

/// Environment variable carrying the upstream URL
pub const UPSTREAM_ENV: &str = "UPSTREAM";

/// Container port the service listens on
pub const HTTP_PORT: i32 = 8080;

/// Name of the container port
pub const HTTP_PORT_NAME: &str = "http1";

/// Replica count Kubernetes assumes when `spec.replicas` is unset
const DEFAULT_REPLICAS: i32 = 1;

/// Fixed parts of the pod template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadTemplate {
    /// Container image
    pub image: String,
    /// Value of the `UPSTREAM` environment variable
    pub upstream: String,
}

impl WorkloadTemplate {
    /// Create a template with the given image and upstream
    pub fn new(image: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            upstream: upstream.into(),
        }
    }
}

impl Default for WorkloadTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE, DEFAULT_UPSTREAM)
    }
}

/// Labels joining a Simple's Deployment to its pods
pub fn labels_for_simple(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), APP_LABEL_VALUE.to_string()),
        (CR_LABEL_KEY.to_string(), name.to_string()),
    ])
}

/// Render labels as an equality-based selector string (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the Deployment for a Simple.
///
/// The returned object carries no owner reference; attach one with
/// [`set_owner_reference`] before submitting it.
pub fn deployment_for_simple(
    simple: &Simple,
    template: &WorkloadTemplate,
) -> Result<Deployment, Error> {
    let name = simple
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = simple
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let labels = labels_for_simple(&name);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(template.image.clone()),
        env: Some(vec![EnvVar {
            name: UPSTREAM_ENV.to_string(),
            value: Some(template.upstream.clone()),
            ..Default::default()
        }]),
        ports: Some(vec![ContainerPort {
            container_port: HTTP_PORT,
            name: Some(HTTP_PORT_NAME.to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(simple.spec.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Register `owner` as the controlling owner of `dependent`.
///
/// The API server garbage-collects the dependent when the owner is deleted.
/// Fails if the owner has no uid yet, or if the dependent is already
/// controlled by a different object.
pub fn set_owner_reference(owner: &Simple, dependent: &mut ObjectMeta) -> Result<(), Error> {
    let mut oref = owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation(format!(
            "Simple {} has no uid, cannot own dependents",
            owner.name_any()
        ))
    })?;
    // Foreground deletion of the Simple waits for the Deployment
    oref.block_owner_deletion = Some(true);

    let refs = dependent.owner_references.get_or_insert_with(Vec::new);
    if let Some(existing) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != oref.uid)
    {
        return Err(Error::validation(format!(
            "object is already controlled by {} {}",
            existing.kind, existing.name
        )));
    }

    refs.retain(|r| r.uid != oref.uid);
    refs.push(oref);
    Ok(())
}

/// Replica count of a Deployment, applying the Kubernetes default when unset
pub fn replicas_of(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(DEFAULT_REPLICAS)
}

/// Names of the given pods, in listing order
pub fn pod_names(pods: &[Pod]) -> Vec<String> {
    pods.iter().filter_map(|p| p.metadata.name.clone()).collect()
}
