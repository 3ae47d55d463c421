//! Settlement records keyed by [`Fingerprint`].

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::proto::{SettlementResult, TransactionReference};
use crate::scheme::Fingerprint;

/// Answer of [`SettlementStore::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// No record existed; the caller now owns a fresh submission.
    Acquired,
    /// Another settlement of this fingerprint is running.
    InFlight,
    /// A terminal result is already recorded.
    Settled(SettlementResult),
    /// An earlier attempt ended without a known outcome. The caller owns the
    /// fingerprint again and must consult the chain before resubmitting.
    Reconcile {
        /// Transaction submitted by the earlier attempt, if it got that far.
        reference: Option<TransactionReference>,
    },
}

/// Settlement registry.
///
/// `claim` must be atomic: of any number of concurrent claims on one
/// fingerprint, exactly one observes [`Claim::Acquired`] or
/// [`Claim::Reconcile`].
pub trait SettlementStore: Send + Sync {
    /// Takes ownership of `fingerprint` if nobody holds it.
    fn claim(&self, fingerprint: Fingerprint) -> Claim;

    /// Records a terminal result and releases ownership.
    fn complete(&self, fingerprint: Fingerprint, result: SettlementResult);

    /// Records that the outcome is unknown and releases ownership.
    fn mark_unresolved(&self, fingerprint: Fingerprint, reference: Option<TransactionReference>);

    /// Forgets a claim that never reached the chain, so the next claim is
    /// [`Claim::Acquired`] again.
    fn release(&self, fingerprint: Fingerprint);
}

#[derive(Debug, Clone)]
enum Record {
    Pending,
    Settled(SettlementResult),
    Unresolved(Option<TransactionReference>),
}

/// Process-local [`SettlementStore`] on a sharded concurrent map.
///
/// Records live as long as the store; scope it to the facilitator (or the
/// resource server settling locally).
#[derive(Debug, Default)]
pub struct InMemorySettlementStore {
    records: DashMap<Fingerprint, Record>,
}

impl InMemorySettlementStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fingerprints with any record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The terminal result recorded for `fingerprint`, if any.
    #[must_use]
    pub fn settled(&self, fingerprint: &Fingerprint) -> Option<SettlementResult> {
        self.records.get(fingerprint).and_then(|record| match &*record {
            Record::Settled(result) => Some(result.clone()),
            Record::Pending | Record::Unresolved(_) => None,
        })
    }
}

impl SettlementStore for InMemorySettlementStore {
    fn claim(&self, fingerprint: Fingerprint) -> Claim {
        match self.records.entry(fingerprint) {
            Entry::Vacant(vacant) => {
                vacant.insert(Record::Pending);
                Claim::Acquired
            }
            Entry::Occupied(mut occupied) => match occupied.get() {
                Record::Pending => Claim::InFlight,
                Record::Settled(result) => Claim::Settled(result.clone()),
                Record::Unresolved(reference) => {
                    let reference = reference.clone();
                    occupied.insert(Record::Pending);
                    Claim::Reconcile { reference }
                }
            },
        }
    }

    fn complete(&self, fingerprint: Fingerprint, result: SettlementResult) {
        self.records.insert(fingerprint, Record::Settled(result));
    }

    fn mark_unresolved(&self, fingerprint: Fingerprint, reference: Option<TransactionReference>) {
        self.records.insert(fingerprint, Record::Unresolved(reference));
    }

    fn release(&self, fingerprint: Fingerprint) {
        self.records
            .remove_if(&fingerprint, |_, record| matches!(record, Record::Pending));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;

    fn fp(tag: &[u8]) -> Fingerprint {
        Fingerprint::derive(&[tag])
    }

    fn success() -> SettlementResult {
        SettlementResult::Success {
            payer: "0xpayer".into(),
            transaction: TransactionReference("0xtx".into()),
            network: ChainId::new("eip155", "84532"),
        }
    }

    #[test]
    fn test_claim_lifecycle() {
        let store = InMemorySettlementStore::new();
        assert_eq!(store.claim(fp(b"a")), Claim::Acquired);
        assert_eq!(store.claim(fp(b"a")), Claim::InFlight);
        store.complete(fp(b"a"), success());
        assert_eq!(store.claim(fp(b"a")), Claim::Settled(success()));
        assert_eq!(store.settled(&fp(b"a")), Some(success()));
        assert_eq!(store.claim(fp(b"b")), Claim::Acquired);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unresolved_is_reclaimed_once() {
        let store = InMemorySettlementStore::new();
        let reference = Some(TransactionReference("0xtx".into()));
        assert_eq!(store.claim(fp(b"a")), Claim::Acquired);
        store.mark_unresolved(fp(b"a"), reference.clone());
        assert_eq!(store.claim(fp(b"a")), Claim::Reconcile { reference });
        assert_eq!(store.claim(fp(b"a")), Claim::InFlight);
    }

    #[test]
    fn test_released_claim_can_be_acquired_again() {
        let store = InMemorySettlementStore::new();
        assert_eq!(store.claim(fp(b"a")), Claim::Acquired);
        store.release(fp(b"a"));
        assert!(store.is_empty());
        assert_eq!(store.claim(fp(b"a")), Claim::Acquired);

        store.complete(fp(b"a"), success());
        store.release(fp(b"a"));
        assert_eq!(store.claim(fp(b"a")), Claim::Settled(success()));
    }
}
