//! Simple operator - CRD-driven Kubernetes controller for a scaled service
//!
//! A `Simple` resource declares how many instances of the simple service should
//! run. The operator keeps a Deployment of that size in the same namespace and
//! reports the names of its pods back in the Simple's status.
//!
//! # Modules
//!
//! - [`crd`] - The `Simple` Custom Resource Definition
//! - [`controller`] - Level-triggered reconciliation logic
//! - [`workload`] - Deployment, label and owner-reference construction
//! - [`config`] - Reconciler tunables
//! - [`retry`] - Backoff helper for start-up calls
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod retry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
