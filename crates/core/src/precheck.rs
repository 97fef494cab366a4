//! TXT precheck for the manual flow.
//!
//! Runs before the CA is asked to validate, so a missing record fails locally
//! instead of burning a CA validation attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use easyacme_common::{EasyAcmeError, EasyAcmeResult};

use crate::dns::TxtResolver;

/// Delay before the single retry
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DnsPrecheck {
    resolver: Arc<dyn TxtResolver>,
    retry_delay: Duration,
}

impl DnsPrecheck {
    pub fn new(resolver: Arc<dyn TxtResolver>, retry_delay: Duration) -> Self {
        Self {
            resolver,
            retry_delay,
        }
    }

    /// Succeed once `expected` is among the TXT values at `fqdn`.
    ///
    /// Looks up at most twice, `retry_delay` apart. Lookup failures count as
    /// an empty answer. Cancelling `cancel` cuts the wait short.
    pub async fn verify_txt(
        &self,
        fqdn: &str,
        expected: &str,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<()> {
        let observed = self.lookup(fqdn).await;
        if observed.iter().any(|v| v == expected) {
            debug!(fqdn, "TXT record present");
            return Ok(());
        }

        warn!(
            fqdn,
            observed = ?observed,
            retry_in_secs = self.retry_delay.as_secs(),
            "TXT record not visible yet, retrying once"
        );
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(EasyAcmeError::cancelled("DNS precheck"));
                    }
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }
            None => tokio::time::sleep(self.retry_delay).await,
        }

        let observed = self.lookup(fqdn).await;
        if observed.iter().any(|v| v == expected) {
            info!(fqdn, "TXT record present after retry");
            return Ok(());
        }

        Err(EasyAcmeError::Precheck {
            fqdn: fqdn.to_string(),
            expected: expected.to_string(),
            observed,
        })
    }

    async fn lookup(&self, fqdn: &str) -> Vec<String> {
        match self.resolver.lookup_txt(fqdn).await {
            Ok(values) => values,
            Err(e) => {
                warn!(fqdn, error = %e, "TXT lookup failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    use crate::dns::{DnsProviderError, DnsResult};

    #[derive(Debug)]
    struct Sequence {
        answers: Mutex<Vec<DnsResult<Vec<String>>>>,
        times: Mutex<Vec<Instant>>,
    }

    impl Sequence {
        fn new(answers: Vec<DnsResult<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                times: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TxtResolver for Sequence {
        async fn lookup_txt(&self, _fqdn: &str) -> DnsResult<Vec<String>> {
            self.times.lock().push(Instant::now());
            let mut answers = self.answers.lock();
            if answers.is_empty() {
                Ok(Vec::new())
            } else {
                answers.remove(0)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_on_first_lookup() {
        let resolver = Sequence::new(vec![Ok(vec!["other".into(), "want".into()])]);
        let precheck = DnsPrecheck::new(resolver.clone(), DEFAULT_RETRY_DELAY);

        precheck
            .verify_txt("_acme-challenge.example.com.", "want", None)
            .await
            .unwrap();
        assert_eq!(resolver.times.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_after_single_retry() {
        let resolver = Sequence::new(vec![Ok(vec![]), Ok(vec!["want".into()])]);
        let precheck = DnsPrecheck::new(resolver.clone(), DEFAULT_RETRY_DELAY);

        precheck
            .verify_txt("_acme-challenge.example.com.", "want", None)
            .await
            .unwrap();
        let times = resolver.times.lock();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - times[0], Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_names_fqdn_expected_and_observed() {
        let resolver = Sequence::new(vec![
            Err(DnsProviderError::Lookup {
                fqdn: "_acme-challenge.example.com.".into(),
                message: "SERVFAIL".into(),
            }),
            Ok(vec!["stale".into()]),
            Ok(vec!["want".into()]),
        ]);
        let precheck = DnsPrecheck::new(resolver.clone(), DEFAULT_RETRY_DELAY);

        let err = precheck
            .verify_txt("_acme-challenge.example.com.", "want", None)
            .await
            .unwrap_err();
        match &err {
            EasyAcmeError::Precheck {
                fqdn,
                expected,
                observed,
            } => {
                assert_eq!(fqdn, "_acme-challenge.example.com.");
                assert_eq!(expected, "want");
                assert_eq!(observed, &vec!["stale".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.kind(), easyacme_common::ErrorKind::Dns);
        // exactly one retry
        assert_eq!(resolver.times.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_delay() {
        let resolver = Sequence::new(vec![Ok(vec![]), Ok(vec!["want".into()])]);
        let precheck = DnsPrecheck::new(resolver.clone(), DEFAULT_RETRY_DELAY);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = precheck
            .verify_txt("_acme-challenge.example.com.", "want", Some(&cancel))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), easyacme_common::ErrorKind::Cancelled);
        assert!(started.elapsed() < DEFAULT_RETRY_DELAY);
        assert_eq!(resolver.times.lock().len(), 1);
    }
}
