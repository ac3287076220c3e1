//! Simple Custom Resource Definition
//!
//! A Simple describes a scaled service: how many instances of the simple
//! service should run. The operator turns it into a Deployment and reports the
//! names of the running pods back in its status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Simple service
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "simple.eximbills.com",
    version = "v1alpha1",
    kind = "Simple",
    plural = "simples",
    status = "SimpleStatus",
    namespaced,
    printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSpec {
    /// Desired number of service instances
    #[schemars(range(min = 0))]
    pub size: i32,
}

/// Status for a Simple service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimpleStatus {
    /// Names of the pods backing this service, as last observed
    #[serde(default)]
    pub nodes: Vec<String>,
}

impl SimpleStatus {
    /// Create a status reporting the given pod names
    pub fn with_nodes(nodes: Vec<String>) -> Self {
        Self { nodes }
    }
}

impl Simple {
    /// Pod names currently recorded in status (empty when status is unset)
    pub fn nodes(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|s| s.nodes.as_slice())
            .unwrap_or_default()
    }
}
