//! Router Module
//!
//! Credential pool, failure classification, retry policy and the dispatcher
//! that ties them together.

pub mod classify;
pub mod dispatcher;
pub mod key_pool;
pub mod retry;

pub use classify::{classify, FailureKind};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use key_pool::{Credential, CredentialPool};
pub use retry::{AttemptBackoff, RetryPolicy, Sleeper, ThreadSleeper};
