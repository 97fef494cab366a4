//! In-flight manual authorizations.
//!
//! Entries live for a fixed TTL and are keyed by a fingerprint of the request.
//! A second authorization with the same fingerprint replaces the first
//! (last write wins); the replaced session is dropped without notice to its
//! caller. Lookups never create entries: a missing or expired fingerprint is
//! [`EasyAcmeError::AuthorizationExpired`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use easyacme_common::{AccountId, EasyAcmeError, EasyAcmeResult};

use crate::engine::{AcmeEngine, Authorization, Order};
use crate::keys::KeyType;
use crate::order::DomainChallenge;

/// Default lifetime of a pending authorization
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(600);

/// `keyType:accountID:d1,d2,...` with domains in the order given
pub fn fingerprint(key_type: KeyType, account_id: &AccountId, domains: &[String]) -> String {
    format!("{}:{}:{}", key_type, account_id, domains.join(","))
}

/// One manual-flow session between authorize and issue
#[derive(Clone)]
pub struct PendingAuthorization {
    pub fingerprint: String,
    pub key_type: KeyType,
    pub account_id: AccountId,
    pub domains: Vec<String>,
    /// Session the order was created with; validation must reuse it
    pub engine: Arc<dyn AcmeEngine>,
    pub order: Order,
    pub authorizations: Vec<Authorization>,
    pub challenges: Vec<DomainChallenge>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("fingerprint", &self.fingerprint)
            .field("order", &self.order.location)
            .field("authorizations", &self.authorizations.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug)]
struct Slot {
    entry: Arc<PendingAuthorization>,
    inserted: Instant,
}

/// Process-wide store of pending authorizations
#[derive(Debug)]
pub struct PendingAuthorizationCache {
    entries: DashMap<String, Slot>,
    ttl: Duration,
}

impl Default for PendingAuthorizationCache {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TTL)
    }
}

impl PendingAuthorizationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `entry`, replacing any session under the same fingerprint.
    ///
    /// Expired entries are swept first so abandoned sessions do not pile up.
    pub fn insert(&self, entry: PendingAuthorization) {
        let purged = self.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired pending authorizations");
        }
        let fingerprint = entry.fingerprint.clone();
        let slot = Slot {
            entry: Arc::new(entry),
            inserted: Instant::now(),
        };
        if self.entries.insert(fingerprint.clone(), slot).is_some() {
            warn!(
                fingerprint = %fingerprint,
                "Replaced pending authorization with the same fingerprint"
            );
        } else {
            debug!(fingerprint = %fingerprint, "Stored pending authorization");
        }
    }

    /// Live entry for `fingerprint`; expired entries are evicted on read
    pub fn get(&self, fingerprint: &str) -> EasyAcmeResult<Arc<PendingAuthorization>> {
        let expired = match self.entries.get(fingerprint) {
            Some(slot) if slot.inserted.elapsed() < self.ttl => {
                return Ok(Arc::clone(&slot.entry));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            // Only evict if the slot was not replaced in between
            self.entries
                .remove_if(fingerprint, |_, slot| slot.inserted.elapsed() >= self.ttl);
            debug!(fingerprint, "Pending authorization expired");
        }
        Err(EasyAcmeError::AuthorizationExpired {
            fingerprint: fingerprint.to_string(),
        })
    }

    pub fn remove(&self, fingerprint: &str) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Drop every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, slot| slot.inserted.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
