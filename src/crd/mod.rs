//! Custom Resource Definitions for the Simple operator

mod simple;

pub use simple::{Simple, SimpleSpec, SimpleStatus};
