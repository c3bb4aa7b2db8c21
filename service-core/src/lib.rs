//! service-core: shared infrastructure for the credential platform.
//!
//! Carries the wire error envelope, the success/list envelopes, and
//! tracing initialization used by every surface.

pub mod envelope;
pub mod error;
pub mod observability;
