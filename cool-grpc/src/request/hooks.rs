//! Caller callbacks around a dispatch.

use super::RequestDescriptor;
use crate::ResponseEnvelope;

/// Runs once the call is resolved and credentialed, before anything is sent.
pub type BeforeRequest = Box<dyn FnOnce(&mut RequestDescriptor) + Send>;

/// Runs once the response is complete, before it is returned.
pub type AfterResponse = Box<dyn FnOnce(&mut ResponseEnvelope) + Send>;

/// Optional callbacks for one call.
///
/// Changes a `before_request` hook makes to the request data or metadata are
/// what gets sent.
#[derive(Default)]
pub struct Hooks {
    pub before_request: Option<BeforeRequest>,
    pub after_response: Option<AfterResponse>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut RequestDescriptor) + Send + 'static,
    {
        self.before_request = Some(Box::new(hook));
        self
    }

    pub fn after_response<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut ResponseEnvelope) + Send + 'static,
    {
        self.after_response = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_request", &self.before_request.is_some())
            .field("after_response", &self.after_response.is_some())
            .finish()
    }
}
