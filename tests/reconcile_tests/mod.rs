//! Stories about how the reconciler converges a Simple over several passes
//!
//! # Test Organization
//!
//! - `store`: in-memory cluster store recording every read and write
//! - `convergence`: creation, resizing, status mirroring and idempotence
//! - `isolation`: failures, stale writes and cross-key independence

mod isolation;
