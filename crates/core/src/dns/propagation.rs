//! DNS propagation checking for DNS-01 challenges
//!
//! Waits until a published TXT record is visible before the CA is asked to
//! validate. Used by the automatic flow only; the manual flow runs the
//! single-retry precheck instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use easyacme_config::PropagationConfig;

use super::provider::{ChallengeRecord, DnsProviderError, DnsResult};
use super::resolver::TxtResolver;

/// DNS propagation checker
#[derive(Debug, Clone)]
pub struct PropagationChecker {
    resolver: Arc<dyn TxtResolver>,
    initial_delay: Duration,
    check_interval: Duration,
    timeout: Duration,
}

impl PropagationChecker {
    pub fn new(
        resolver: Arc<dyn TxtResolver>,
        initial_delay: Duration,
        check_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            initial_delay,
            check_interval,
            timeout,
        }
    }

    pub fn from_config(resolver: Arc<dyn TxtResolver>, config: &PropagationConfig) -> Self {
        Self::new(
            resolver,
            config.initial_delay(),
            config.check_interval(),
            config.timeout(),
        )
    }

    /// Wait until `record` resolves with its expected value
    pub async fn wait_for(&self, record: &ChallengeRecord) -> DnsResult<()> {
        let start = Instant::now();
        let deadline = start + self.timeout;

        debug!(
            record = %record.fqdn,
            timeout_secs = self.timeout.as_secs(),
            "Waiting for DNS propagation"
        );

        tokio::time::sleep(self.initial_delay).await;

        loop {
            match self.check_record(record).await {
                Ok(true) => {
                    debug!(
                        record = %record.fqdn,
                        elapsed_secs = start.elapsed().as_secs(),
                        "DNS propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    trace!(record = %record.fqdn, "Record not yet propagated");
                }
                Err(e) => {
                    warn!(record = %record.fqdn, error = %e, "DNS lookup error");
                }
            }

            if Instant::now() >= deadline {
                return Err(DnsProviderError::Timeout {
                    elapsed_secs: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.check_interval).await;
        }
    }

    /// Single lookup, no waiting
    pub async fn check_record(&self, record: &ChallengeRecord) -> DnsResult<bool> {
        let values = self.resolver.lookup_txt(&record.fqdn).await?;
        Ok(values.iter().any(|v| v == &record.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::dns::provider::challenge_record;

    /// Answers from a script, one entry per lookup; the last entry repeats
    #[derive(Debug)]
    struct ScriptedResolver {
        answers: Mutex<Vec<Vec<String>>>,
        lookups: Mutex<usize>,
    }

    impl ScriptedResolver {
        fn new(answers: Vec<Vec<String>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                lookups: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl TxtResolver for ScriptedResolver {
        async fn lookup_txt(&self, _fqdn: &str) -> DnsResult<Vec<String>> {
            *self.lookups.lock() += 1;
            let mut answers = self.answers.lock();
            if answers.len() > 1 {
                Ok(answers.remove(0))
            } else {
                Ok(answers.first().cloned().unwrap_or_default())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_visible() {
        let record = challenge_record("example.com", "token.thumb");
        let resolver = Arc::new(ScriptedResolver::new(vec![
            vec![],
            vec!["stale".into()],
            vec![record.value.clone()],
        ]));
        let checker = PropagationChecker::new(
            resolver.clone(),
            Duration::from_secs(10),
            Duration::from_secs(5),
            Duration::from_secs(120),
        );

        checker.wait_for(&record).await.unwrap();
        assert_eq!(*resolver.lookups.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let record = challenge_record("example.com", "token.thumb");
        let resolver = Arc::new(ScriptedResolver::new(vec![vec![]]));
        let checker = PropagationChecker::new(
            resolver,
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(20),
        );

        let err = checker.wait_for(&record).await.unwrap_err();
        assert!(matches!(err, DnsProviderError::Timeout { elapsed_secs: 20 }));
    }
}
