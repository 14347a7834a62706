//! Bindings to the opaque downstream agent SDK (§2, §4.4.1 step 4).
//!
//! Implementing the agent itself is explicitly out of scope; this crate
//! only adapts the `AgentRuntime` trait seam to an HTTP transport, plus a
//! disabled stand-in for when no binding is configured.

pub mod client;
pub mod disabled;
pub mod error;

pub use client::{HttpAgentRuntime, RuntimeConfig};
pub use disabled::DisabledAgentRuntime;
pub use error::RuntimeAdapterError;
