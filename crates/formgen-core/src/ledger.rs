//! Commit idempotency ledger
//!
//! Each commit attempt claims a key before it touches the repository. A
//! second attempt with the same key either waits its turn (the first is
//! still running) or is pointed at the form the first one committed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use formgen_definition::DefinitionHash;
use formgen_session::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Identifies one commit attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key chosen by the client
    #[must_use]
    pub fn explicit(session: SessionId, key: &str) -> Self {
        Self(format!("{session}:client:{key}"))
    }

    /// Key derived from the definition being committed
    #[must_use]
    pub fn derived(session: SessionId, content: DefinitionHash) -> Self {
        Self(format!("{session}:content:{content}"))
    }

    /// Key text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A form committed under some key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedForm {
    pub form_id: String,
    pub slug: String,
    /// Where the committing request was redirected
    pub location: String,
}

/// Result of claiming a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Caller owns the attempt and must `complete` or `release` it
    Acquired,
    /// Another attempt with this key is running
    InFlight,
    /// The key already committed this form
    Committed(CommittedForm),
}

#[derive(Debug)]
enum Slot {
    InFlight,
    Committed { form: CommittedForm, at: Instant },
}

/// Idempotency keys of commit attempts
#[derive(Debug)]
pub struct CommitLedger {
    entries: DashMap<IdempotencyKey, Slot>,
    retention: Duration,
}

impl CommitLedger {
    /// Create ledger keeping committed keys for `retention`
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// Claim a key for a new attempt
    pub fn claim(&self, key: &IdempotencyKey) -> Claim {
        self.prune();
        match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::InFlight);
                Claim::Acquired
            }
            Entry::Occupied(occupied) => match occupied.get() {
                Slot::InFlight => Claim::InFlight,
                Slot::Committed { form, .. } => Claim::Committed(form.clone()),
            },
        }
    }

    /// Form committed under a key, if any
    #[must_use]
    pub fn committed(&self, key: &IdempotencyKey) -> Option<CommittedForm> {
        self.entries.get(key).and_then(|entry| match &*entry {
            Slot::Committed { form, .. } => Some(form.clone()),
            Slot::InFlight => None,
        })
    }

    /// Record a successful commit
    pub fn complete(&self, key: &IdempotencyKey, form: CommittedForm) {
        self.entries.insert(
            key.clone(),
            Slot::Committed {
                form,
                at: Instant::now(),
            },
        );
    }

    /// Give a key back after a failed attempt
    pub fn release(&self, key: &IdempotencyKey) {
        self.entries
            .remove_if(key, |_, entry| matches!(entry, Slot::InFlight));
    }

    /// Number of held keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&self) {
        let retention = self.retention;
        self.entries.retain(|_, entry| match entry {
            Slot::InFlight => true,
            Slot::Committed { at, .. } => at.elapsed() < retention,
        });
    }
}

impl Default for CommitLedger {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn committed() -> CommittedForm {
        CommittedForm {
            form_id: "01J".into(),
            slug: "dog-licence".into(),
            location: "/library/dog-licence".into(),
        }
    }

    #[test]
    fn claim_is_exclusive() {
        let ledger = CommitLedger::default();
        let key = IdempotencyKey::explicit(SessionId::new(), "a");

        assert_eq!(ledger.claim(&key), Claim::Acquired);
        assert_eq!(ledger.claim(&key), Claim::InFlight);
    }

    #[test]
    fn release_allows_retry() {
        let ledger = CommitLedger::default();
        let key = IdempotencyKey::explicit(SessionId::new(), "a");

        ledger.claim(&key);
        ledger.release(&key);
        assert_eq!(ledger.claim(&key), Claim::Acquired);
    }

    #[test]
    fn committed_keys_redirect() {
        let ledger = CommitLedger::default();
        let key = IdempotencyKey::explicit(SessionId::new(), "a");

        ledger.claim(&key);
        ledger.complete(&key, committed());
        assert_eq!(ledger.claim(&key), Claim::Committed(committed()));

        // Release after success keeps the record
        ledger.release(&key);
        assert_eq!(ledger.committed(&key), Some(committed()));
    }

    #[test]
    fn committed_keys_expire() {
        let ledger = CommitLedger::new(Duration::ZERO);
        let key = IdempotencyKey::explicit(SessionId::new(), "a");

        ledger.claim(&key);
        ledger.complete(&key, committed());
        assert_eq!(ledger.claim(&key), Claim::Acquired);
    }

    #[test]
    fn keys_are_scoped_to_session() {
        let a = IdempotencyKey::explicit(SessionId::new(), "same");
        let b = IdempotencyKey::explicit(SessionId::new(), "same");
        assert_ne!(a, b);
    }

    #[test]
    fn derived_keys_follow_content() {
        let session = SessionId::new();
        let one = DefinitionHash::compute(b"one");
        let two = DefinitionHash::compute(b"two");
        assert_eq!(
            IdempotencyKey::derived(session, one),
            IdempotencyKey::derived(session, one)
        );
        assert_ne!(
            IdempotencyKey::derived(session, one),
            IdempotencyKey::derived(session, two)
        );
    }
}
