//! Configuration modules for the dispatcher.
//!
//! This module contains request-level configuration:
//! - [`CallOptions`]: Per-call timeout and receive limit
//! - [`LoaderOptions`]: JSON mapping of dynamic messages

mod loader;
mod options;

pub use loader::LoaderOptions;
pub use options::CallOptions;
pub(crate) use options::duration_to_grpc_timeout;
