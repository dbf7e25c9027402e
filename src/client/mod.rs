//! Client Module
//!
//! The remote call seam and its Gemini HTTP implementation.

pub mod http;
pub mod transport;

pub use http::{GeminiConnector, GeminiTransport};
pub use transport::{Connector, Transport};
