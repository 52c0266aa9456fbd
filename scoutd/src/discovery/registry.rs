use std::collections::{HashMap, HashSet};
use parking_lot::Mutex;
use shared::types::DedupKey;

/// Service types already being browsed. Each type is browsed at most once.
#[derive(Default)]
pub struct ServiceTypeRegistry {
    types: Mutex<HashSet<String>>,
}

impl ServiceTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `service_type` was not yet registered
    pub fn claim(&self, service_type: &str) -> bool {
        self.types.lock().insert(service_type.to_string())
    }

    pub fn contains(&self, service_type: &str) -> bool {
        self.types.lock().contains(service_type)
    }

    /// Sorted copy of the registered types
    pub fn list(&self) -> Vec<String> {
        let mut types: Vec<String> = self.types.lock().iter().cloned().collect();
        types.sort();
        types
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimState {
    /// A resolve is running. `recheck` is set when an update arrived meanwhile.
    Resolving { recheck: bool },
    /// Resolved to a record without details
    Partial,
    Complete,
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    generation: u64,
    state: ClaimState,
}

#[derive(Default)]
struct Claims {
    next: u64,
    claimed: HashMap<DedupKey, Claim>,
}

impl Claims {
    fn bump(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    fn start(&mut self, key: &DedupKey) -> u64 {
        let generation = self.bump();
        self.claimed.insert(
            key.clone(),
            Claim {
                generation,
                state: ClaimState::Resolving { recheck: false },
            },
        );
        generation
    }
}

/// What a finished resolve should do with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// The claim is still current: record the result
    Current,
    /// An update arrived while resolving and the result had no details: resolve again
    Recheck,
    /// The instance was removed or reclaimed since: discard the result
    Stale,
}

/// Presence guard for instances that are resolving or resolved.
///
/// Every claim carries a generation from a counter shared by all keys. Removal retires
/// the claim under a newer generation, so a resolve that was in flight at the time can
/// tell its result is stale.
#[derive(Default)]
pub struct DedupKeys {
    claims: Mutex<Claims>,
}

impl DedupKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-set. Returns a generation for the single caller that claimed `key`.
    pub fn claim(&self, key: &DedupKey) -> Option<u64> {
        let mut claims = self.claims.lock();
        if claims.claimed.contains_key(key) {
            return None;
        }
        Some(claims.start(key))
    }

    /// Claim for an update event. A tracked instance is resolved again only while its
    /// record still lacks details; an update during a resolve schedules one recheck.
    pub fn reclaim(&self, key: &DedupKey) -> Option<u64> {
        let mut claims = self.claims.lock();
        match claims.claimed.get(key).map(|claim| claim.state) {
            None | Some(ClaimState::Partial) => Some(claims.start(key)),
            Some(ClaimState::Resolving { .. }) => {
                if let Some(claim) = claims.claimed.get_mut(key) {
                    claim.state = ClaimState::Resolving { recheck: true };
                }
                None
            }
            Some(ClaimState::Complete) => None,
        }
    }

    /// Record the end of a resolve under `generation`
    pub fn settle(&self, key: &DedupKey, generation: u64, complete: bool) -> Settle {
        let mut claims = self.claims.lock();
        let claim = match claims.claimed.get_mut(key) {
            Some(claim) if claim.generation == generation => claim,
            _ => return Settle::Stale,
        };
        match (claim.state, complete) {
            (ClaimState::Resolving { recheck: true }, false) => {
                claim.state = ClaimState::Resolving { recheck: false };
                Settle::Recheck
            }
            (_, true) => {
                claim.state = ClaimState::Complete;
                Settle::Current
            }
            (_, false) => {
                claim.state = ClaimState::Partial;
                Settle::Current
            }
        }
    }

    /// Drop a failed claim so the next add or update event resolves again.
    /// A claim that was already retired or reclaimed is left alone.
    pub fn release(&self, key: &DedupKey, generation: u64) -> bool {
        let mut claims = self.claims.lock();
        match claims.claimed.get(key) {
            Some(claim) if claim.generation == generation => {
                claims.claimed.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Forget `key` for a remove event. Returns the generation the removal happened at.
    pub fn retire(&self, key: &DedupKey) -> u64 {
        let mut claims = self.claims.lock();
        claims.claimed.remove(key);
        claims.bump()
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.claims.lock().claimed.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.claims.lock().claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
