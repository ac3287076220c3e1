//! Controller implementation for the Simple CRD
//!
//! Controllers follow the Kubernetes controller pattern with observe-diff-act loops.

mod simple;

pub use simple::{
    error_policy, plan_nodes, plan_size, reconcile, reconcile_key, Context, ContextBuilder,
    KubeClient, KubeClientImpl, Requeue, ResourceKey,
};
