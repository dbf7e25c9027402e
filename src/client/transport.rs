//! Remote Call Capability
//!
//! The seam between the dispatcher and whatever actually talks to the service.

use crate::error::RemoteError;
use crate::router::Credential;

/// A handle bound to exactly one credential
pub trait Transport {
    /// Opaque request content
    type Request;

    /// Opaque response content
    type Response;

    /// Issue one call against `target` (e.g. a model name)
    fn call(
        &mut self,
        target: &str,
        request: &Self::Request,
    ) -> std::result::Result<Self::Response, RemoteError>;
}

/// Builds a fresh transport for a credential.
///
/// The dispatcher calls this on every rotation and drops the previous handle.
pub trait Connector {
    type Transport: Transport;

    fn connect(&self, credential: &Credential) -> Self::Transport;
}
