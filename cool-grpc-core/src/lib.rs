//! Core protocol types for cool-grpc.
//!
//! This crate provides the pieces of the gRPC wire protocol that the
//! dispatcher (`cool-grpc`) and its transports share.
//!
//! ## Modules
//!
//! - [`error`]: Status codes and the [`Status`] type
//! - [`envelope`]: Length-prefixed message framing

mod envelope;
mod error;

pub use envelope::*;
pub use error::*;
