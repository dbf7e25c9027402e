//! Request Dispatcher
//!
//! Executes one logical request at a time against a pool of interchangeable
//! keys, retrying transient failures in place and rotating on key-scoped ones.

use crate::client::{Connector, Transport};
use crate::error::{RelayError, RemoteError, Result};
use crate::router::classify::classify;
use crate::router::key_pool::CredentialPool;
use crate::router::retry::{AttemptBackoff, RetryPolicy, Sleeper, ThreadSleeper};
use backoff::backoff::Backoff;
use tracing::{debug, error, info, warn};

type RequestOf<C> = <<C as Connector>::Transport as Transport>::Request;
type ResponseOf<C> = <<C as Connector>::Transport as Transport>::Response;

/// Counters accumulated over the dispatcher's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Calls issued through a transport
    pub attempts: u64,

    /// Same-key retries after a transient failure
    pub retries: u64,

    /// Cursor advances
    pub rotations: u64,

    /// `execute` calls that ended in exhaustion
    pub exhaustions: u64,
}

/// Credential pool plus retry and failover policy
pub struct Dispatcher<C: Connector, S: Sleeper = ThreadSleeper> {
    pool: CredentialPool,
    connector: C,
    transport: C::Transport,
    backoff: AttemptBackoff,
    sleeper: S,
    stats: DispatchStats,
}

impl<C: Connector> Dispatcher<C> {
    /// Create a dispatcher that blocks the calling thread between retries
    pub fn new(pool: CredentialPool, connector: C, policy: RetryPolicy) -> Result<Self> {
        Self::with_sleeper(pool, connector, policy, ThreadSleeper)
    }
}

impl<C: Connector, S: Sleeper> Dispatcher<C, S> {
    /// Create a dispatcher with a custom sleeper
    pub fn with_sleeper(
        pool: CredentialPool,
        connector: C,
        policy: RetryPolicy,
        sleeper: S,
    ) -> Result<Self> {
        if policy.max_retries == 0 {
            return Err(RelayError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let transport = connector.connect(pool.current());

        Ok(Self {
            pool,
            connector,
            transport,
            backoff: AttemptBackoff::new(policy),
            sleeper,
            stats: DispatchStats::default(),
        })
    }

    /// Execute a request, retrying and rotating keys until it succeeds or every
    /// key in the pool has been tried.
    pub fn execute(&mut self, request: &RequestOf<C>) -> Result<ResponseOf<C>> {
        let pool_size = self.pool.len();
        let mut credentials_tried = 0;
        let mut last_error: Option<RemoteError> = None;

        while credentials_tried < pool_size {
            self.backoff.reset();

            loop {
                self.stats.attempts += 1;
                debug!(
                    key = self.pool.position(),
                    attempt = self.backoff.attempt() + 1,
                    model = self.pool.target(),
                    "Sending request"
                );

                let err = match self.transport.call(self.pool.target(), request) {
                    Ok(response) => return Ok(response),
                    Err(err) => err,
                };

                let kind = classify(&err);
                if kind.is_credential_scoped() {
                    warn!(
                        key = self.pool.position(),
                        reason = %kind,
                        error = %err,
                        "Key unusable, switching"
                    );
                    last_error = Some(err);
                    break;
                }

                match self.backoff.next_backoff() {
                    Some(wait) => {
                        warn!(
                            key = self.pool.position(),
                            attempt = self.backoff.attempt(),
                            max_retries = self.backoff.policy().max_retries,
                            wait_ms = wait.as_millis() as u64,
                            error = %err,
                            "Request failed, retrying"
                        );
                        last_error = Some(err);
                        self.stats.retries += 1;
                        self.sleeper.sleep(wait);
                    }
                    None => {
                        warn!(
                            key = self.pool.position(),
                            max_retries = self.backoff.policy().max_retries,
                            error = %err,
                            "Retries exhausted on key"
                        );
                        last_error = Some(err);
                        break;
                    }
                }
            }

            credentials_tried += 1;
            if credentials_tried < pool_size {
                self.rotate();
            }
        }

        self.stats.exhaustions += 1;
        let last_error = last_error
            .unwrap_or_else(|| RemoteError::unstructured("no attempt was made"));
        error!(
            keys = pool_size,
            error = %last_error,
            "All API keys exhausted"
        );

        Err(RelayError::AllCredentialsExhausted {
            tried: pool_size,
            last_error,
        })
    }

    /// Advance to the next key and replace the transport with one bound to it
    fn rotate(&mut self) {
        let from = self.pool.position();
        let credential = self.pool.advance();
        self.transport = self.connector.connect(credential);
        self.stats.rotations += 1;
        info!(from, to = self.pool.position(), "Switched API key");
    }

    /// The credential pool
    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Lifetime counters
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// The sleeper used between retries
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Credential;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;
    use std::time::Duration;

    /// Scripted outcomes per key; once a script runs out, the key keeps
    /// returning its last outcome.
    #[derive(Clone, Default)]
    struct Script {
        outcomes: Rc<RefCell<HashMap<String, VecDeque<std::result::Result<String, RemoteError>>>>>,
        calls: Rc<RefCell<Vec<String>>>,
        connects: Rc<RefCell<Vec<String>>>,
    }

    impl Script {
        fn on(self, key: &str, outcomes: Vec<std::result::Result<String, RemoteError>>) -> Self {
            self.outcomes
                .borrow_mut()
                .insert(key.to_string(), outcomes.into());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn connects(&self) -> Vec<String> {
            self.connects.borrow().clone()
        }
    }

    struct FakeTransport {
        key: String,
        script: Script,
    }

    impl Transport for FakeTransport {
        type Request = String;
        type Response = String;

        fn call(
            &mut self,
            target: &str,
            request: &String,
        ) -> std::result::Result<String, RemoteError> {
            assert_eq!(target, "gemini-test");
            self.script.calls.borrow_mut().push(self.key.clone());

            let mut outcomes = self.script.outcomes.borrow_mut();
            let queue = outcomes.entry(self.key.clone()).or_default();
            let outcome = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            outcome
                .unwrap_or_else(|| Ok(format!("{} via {}", request, self.key)))
        }
    }

    struct FakeConnector {
        script: Script,
    }

    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        fn connect(&self, credential: &Credential) -> FakeTransport {
            self.script
                .connects
                .borrow_mut()
                .push(credential.value().to_string());
            FakeTransport {
                key: credential.value().to_string(),
                script: self.script.clone(),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSleeper {
        waits: Rc<RefCell<Vec<Duration>>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.waits.borrow_mut().push(duration);
        }
    }

    impl RecordingSleeper {
        fn waits(&self) -> Vec<Duration> {
            self.waits.borrow().clone()
        }
    }

    fn rate_limited() -> std::result::Result<String, RemoteError> {
        Err(RemoteError::new(
            Some(429),
            Some("RESOURCE_EXHAUSTED".into()),
            "Resource has been exhausted (e.g. check quota).",
        ))
    }

    fn invalid_key() -> std::result::Result<String, RemoteError> {
        Err(RemoteError::new(
            Some(400),
            Some("API_KEY_INVALID".into()),
            "API key not valid. Please pass a valid API key.",
        ))
    }

    fn transient() -> std::result::Result<String, RemoteError> {
        Err(RemoteError::new(
            Some(503),
            Some("UNAVAILABLE".into()),
            "The model is overloaded.",
        ))
    }

    fn ok(body: &str) -> std::result::Result<String, RemoteError> {
        Ok(body.to_string())
    }

    fn dispatcher(
        keys: &[&str],
        max_retries: u32,
        script: &Script,
    ) -> Dispatcher<FakeConnector, RecordingSleeper> {
        let pool = CredentialPool::new(
            "gemini-test",
            keys.iter().map(|k| k.to_string()).collect(),
        )
        .unwrap();
        let policy = RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        };
        Dispatcher::with_sleeper(
            pool,
            FakeConnector {
                script: script.clone(),
            },
            policy,
            RecordingSleeper::default(),
        )
        .unwrap()
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn test_first_attempt_success() {
        let script = Script::default().on("A", vec![ok("payload")]);
        let mut d = dispatcher(&["A", "B"], 3, &script);

        assert_eq!(d.execute(&"frame".to_string()).unwrap(), "payload");
        assert_eq!(script.calls(), vec!["A"]);
        assert_eq!(d.stats().rotations, 0);
        assert!(d.sleeper().waits().is_empty());
    }

    #[test]
    fn test_rate_limits_rotate_without_retrying() {
        let script = Script::default()
            .on("A", vec![rate_limited()])
            .on("B", vec![rate_limited()])
            .on("C", vec![ok("payload")]);
        let mut d = dispatcher(&["A", "B", "C", "D"], 3, &script);

        assert_eq!(d.execute(&"frame".to_string()).unwrap(), "payload");
        assert_eq!(script.calls(), vec!["A", "B", "C"]);
        assert_eq!(d.stats().rotations, 2);
        assert_eq!(d.stats().retries, 0);
        assert!(d.sleeper().waits().is_empty());
        assert_eq!(d.pool().cursor(), 2);
    }

    #[test]
    fn test_transient_failures_retry_in_place() {
        let script = Script::default().on(
            "A",
            vec![transient(), transient(), transient(), ok("payload")],
        );
        let mut d = dispatcher(&["A", "B"], 5, &script);

        assert_eq!(d.execute(&"frame".to_string()).unwrap(), "payload");
        assert_eq!(script.calls(), vec!["A", "A", "A", "A"]);
        assert_eq!(d.sleeper().waits(), secs(&[2, 4, 8]));
        assert_eq!(d.stats().rotations, 0);
        assert_eq!(d.stats().retries, 3);
    }

    #[test]
    fn test_mixed_failures_across_pool() {
        let script = Script::default()
            .on("A", vec![rate_limited()])
            .on("B", vec![invalid_key()])
            .on("C", vec![transient(), ok("payload")]);
        let mut d = dispatcher(&["A", "B", "C"], 3, &script);

        assert_eq!(d.execute(&"frame".to_string()).unwrap(), "payload");
        assert_eq!(script.calls(), vec!["A", "B", "C", "C"]);
        assert_eq!(d.stats().rotations, 2);
        assert_eq!(d.stats().retries, 1);
        assert_eq!(d.sleeper().waits(), secs(&[2]));
    }

    #[test]
    fn test_single_key_always_transient() {
        let script = Script::default().on("A", vec![transient()]);
        let mut d = dispatcher(&["A"], 2, &script);

        let err = d.execute(&"frame".to_string()).unwrap_err();
        match err {
            RelayError::AllCredentialsExhausted { tried, last_error } => {
                assert_eq!(tried, 1);
                assert_eq!(last_error.status, Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(script.calls(), vec!["A", "A"]);
        assert_eq!(d.sleeper().waits(), secs(&[2]));
        assert_eq!(d.stats().rotations, 0);
        assert_eq!(d.stats().exhaustions, 1);
    }

    #[test]
    fn test_exhaustion_tries_every_key_once() {
        let script = Script::default()
            .on("A", vec![rate_limited()])
            .on("B", vec![transient()])
            .on("C", vec![invalid_key()]);
        let mut d = dispatcher(&["A", "B", "C"], 3, &script);

        let err = d.execute(&"frame".to_string()).unwrap_err();
        match err {
            RelayError::AllCredentialsExhausted { tried, last_error } => {
                assert_eq!(tried, 3);
                assert_eq!(last_error.code.as_deref(), Some("API_KEY_INVALID"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(script.calls(), vec!["A", "B", "B", "B", "C"]);
        assert_eq!(d.sleeper().waits(), secs(&[2, 4]));
        // No rotation after the last key
        assert_eq!(d.stats().rotations, 2);
        assert_eq!(d.pool().cursor(), 2);
    }

    #[test]
    fn test_rotation_is_cyclic_from_current_cursor() {
        let script = Script::default()
            .on("A", vec![rate_limited(), rate_limited()])
            .on("B", vec![ok("first"), rate_limited()])
            .on("C", vec![rate_limited()]);
        let mut d = dispatcher(&["A", "B", "C"], 3, &script);

        assert_eq!(d.execute(&"one".to_string()).unwrap(), "first");
        assert_eq!(d.pool().cursor(), 1);

        assert!(d.execute(&"two".to_string()).is_err());
        // Second call starts at B and wraps around: B, C, A
        assert_eq!(script.calls(), vec!["A", "B", "B", "C", "A"]);
        assert_eq!(d.pool().cursor(), 0);
    }

    #[test]
    fn test_rotation_rebuilds_transport() {
        let script = Script::default()
            .on("A", vec![invalid_key()])
            .on("B", vec![ok("payload")]);
        let mut d = dispatcher(&["A", "B"], 3, &script);

        d.execute(&"frame".to_string()).unwrap();
        assert_eq!(script.connects(), vec!["A", "B"]);
    }

    #[test]
    fn test_retry_budget_resets_after_rotation() {
        let script = Script::default()
            .on("A", vec![transient()])
            .on("B", vec![transient(), transient(), ok("payload")]);
        let mut d = dispatcher(&["A", "B"], 3, &script);

        assert_eq!(d.execute(&"frame".to_string()).unwrap(), "payload");
        assert_eq!(script.calls(), vec!["A", "A", "A", "B", "B", "B"]);
        assert_eq!(d.sleeper().waits(), secs(&[2, 4, 2, 4]));
    }

    #[test]
    fn test_identical_errors_handled_the_same_on_every_key() {
        // Both keys return byte-identical errors; the decision must depend
        // only on the error, not on which key produced it.
        let script = Script::default()
            .on("A", vec![transient()])
            .on("B", vec![transient()]);
        let mut d = dispatcher(&["A", "B"], 2, &script);

        assert!(d.execute(&"frame".to_string()).is_err());
        assert_eq!(script.calls(), vec!["A", "A", "B", "B"]);
        assert_eq!(d.sleeper().waits(), secs(&[2, 2]));
        assert_eq!(d.stats().retries, 2);

        let script = Script::default()
            .on("A", vec![rate_limited()])
            .on("B", vec![rate_limited()]);
        let mut d = dispatcher(&["A", "B"], 2, &script);

        match d.execute(&"frame".to_string()).unwrap_err() {
            RelayError::AllCredentialsExhausted { tried, last_error } => {
                assert_eq!(tried, 2);
                assert_eq!(last_error.code.as_deref(), Some("RESOURCE_EXHAUSTED"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(script.calls(), vec!["A", "B"]);
        assert!(d.sleeper().waits().is_empty());
        assert_eq!(d.stats().retries, 0);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let pool = CredentialPool::new("gemini-test", vec!["A".to_string()]).unwrap();
        let result = Dispatcher::with_sleeper(
            pool,
            FakeConnector {
                script: Script::default(),
            },
            RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            RecordingSleeper::default(),
        );
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
