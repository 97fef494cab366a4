//! Drives DNS-01 authorizations to a terminal state.
//!
//! Per authorization: `pending -> processing -> valid | invalid | deactivated
//! | expired | revoked`. Authorizations are validated one at a time, in order,
//! and the first permanent failure stops the rest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use easyacme_common::{EasyAcmeError, EasyAcmeResult};

use crate::engine::{AcmeEngine, Authorization, Challenge, Status, CHALLENGE_DNS01};
use crate::poll::{drive, Poll, PollSchedule, Poller};

/// Interval used when the CA sends no Retry-After
pub const DEFAULT_CHALLENGE_INTERVAL: Duration = Duration::from_secs(5);

/// `Ok(true)` when valid, `Ok(false)` while the CA is still working
pub fn check_authorization_status(authz: &Authorization) -> EasyAcmeResult<bool> {
    let domain = &authz.identifier.value;
    let operation = format!("validate authorization for {}", domain);
    match authz.status {
        Status::Valid => Ok(true),
        Status::Pending | Status::Processing => Ok(false),
        Status::Deactivated | Status::Expired | Status::Revoked => Err(EasyAcmeError::upstream(
            operation,
            format!("the authorization state {}", authz.status),
        )),
        Status::Invalid => {
            let reason = authz
                .challenges
                .iter()
                .filter(|c| c.status == Status::Invalid)
                .find_map(|c| c.error.as_ref())
                .or_else(|| authz.challenge_error());
            Err(match reason {
                Some(problem) => EasyAcmeError::upstream(operation, problem.to_string()),
                None => EasyAcmeError::upstream(operation, "invalid authorization"),
            })
        }
        other => Err(EasyAcmeError::upstream(
            operation,
            format!(
                "protocol error: unexpected authorization status '{}'",
                other
            ),
        )),
    }
}

/// Same mapping for the challenge resource returned on acceptance
pub fn check_challenge_status(challenge: &Challenge, domain: &str) -> EasyAcmeResult<bool> {
    let operation = format!("validate challenge for {}", domain);
    match challenge.status {
        Status::Valid => Ok(true),
        Status::Pending | Status::Processing => Ok(false),
        Status::Invalid => Err(match &challenge.error {
            Some(problem) => EasyAcmeError::upstream(operation, problem.to_string()),
            None => EasyAcmeError::upstream(operation, "invalid challenge"),
        }),
        other => Err(EasyAcmeError::upstream(
            operation,
            format!("protocol error: unexpected challenge status '{}'", other),
        )),
    }
}

/// One authorization status probe
struct AuthorizationPoller {
    engine: Arc<dyn AcmeEngine>,
    url: String,
    operation: String,
}

#[async_trait]
impl Poller for AuthorizationPoller {
    type Output = Authorization;

    fn operation(&self) -> &str {
        &self.operation
    }

    async fn poll(&mut self) -> EasyAcmeResult<Poll<Authorization>> {
        let mut authz = self
            .engine
            .get_authorization(&self.url)
            .await
            .map_err(|e| e.into_error("get authorization"))?;
        if authz.url.is_empty() {
            authz.url = self.url.clone();
        }
        if check_authorization_status(&authz)? {
            Ok(Poll::Ready(authz))
        } else {
            Ok(Poll::Pending {
                status: authz.status.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeResolver {
    default_interval: Duration,
}

impl Default for ChallengeResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CHALLENGE_INTERVAL)
    }
}

impl ChallengeResolver {
    pub fn new(default_interval: Duration) -> Self {
        Self { default_interval }
    }

    /// Ask the CA to validate `authz` and wait for the outcome
    pub async fn validate(
        &self,
        engine: &Arc<dyn AcmeEngine>,
        authz: &Authorization,
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<()> {
        let domain = authz.identifier.value.as_str();
        if authz.status == Status::Valid {
            debug!(domain, "Authorization already valid");
            return Ok(());
        }

        let challenge = authz.challenge(CHALLENGE_DNS01).ok_or_else(|| {
            EasyAcmeError::upstream(
                format!("validate authorization for {}", domain),
                "the CA offered no dns-01 challenge",
            )
        })?;

        info!(domain, challenge = %challenge.url, "Requesting challenge validation");
        let update = engine
            .accept_challenge(&challenge.url)
            .await
            .map_err(|e| e.into_error("initiate challenge"))?;

        if check_challenge_status(&update.challenge, domain)? {
            info!(domain, "Challenge already valid");
            return Ok(());
        }

        let schedule = PollSchedule::challenge(
            update.retry_after.map(Duration::from_secs),
            self.default_interval,
        );
        let url = if update.authorization_url.is_empty() {
            authz.url.clone()
        } else {
            update.authorization_url
        };
        let mut poller = AuthorizationPoller {
            engine: Arc::clone(engine),
            url,
            operation: format!("validate authorization for {}", domain),
        };

        drive(&mut poller, schedule, cancel).await?;
        info!(domain, "Authorization valid");
        Ok(())
    }

    /// Validate every authorization in order, stopping at the first failure
    pub async fn validate_all(
        &self,
        engine: &Arc<dyn AcmeEngine>,
        authorizations: &[Authorization],
        cancel: Option<&CancellationToken>,
    ) -> EasyAcmeResult<()> {
        for authz in authorizations {
            self.validate(engine, authz, cancel).await?;
        }
        Ok(())
    }
}
