use crate::ir::NodeKind;
use ahash::AHashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// Constant identifiers a platform reserves for "the" start and end node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleIds {
    pub start: String,
    pub end: String,
}

/// Shape of a collision-checked random id.
#[derive(Debug, Clone, Copy)]
pub enum RandomIdFormat {
    /// A millisecond timestamp offset by a random amount.
    Timestamp { base_millis: u64 },
    /// `<prefix>::<uuid>`, with the prefix chosen by node kind.
    PrefixedUuid { prefix: fn(NodeKind) -> &'static str },
}

#[derive(Debug, Clone, Copy)]
pub enum IdStrategy {
    /// Monotonic counter seeded at a platform base.
    Counter { base: u64 },
    /// Random candidates checked against the used set, at most `max_attempts` times.
    CollisionCheckedRandom {
        format: RandomIdFormat,
        max_attempts: u32,
    },
}

/// How a synthetic loop boundary id is derived from its iteration's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticScheme {
    /// `<owner><role>`, e.g. `1718000000123start`.
    Suffix,
    /// Swaps the owner's `<prefix>::` for a role prefix, keeping the suffix.
    PrefixSwap {
        start_prefix: &'static str,
        end_prefix: &'static str,
    },
}

/// The boundary nodes a flat iteration may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticRole {
    LoopStart,
    LoopEnd,
}

impl SyntheticRole {
    pub fn suffix(self) -> &'static str {
        match self {
            SyntheticRole::LoopStart => "start",
            SyntheticRole::LoopEnd => "end",
        }
    }
}

impl SyntheticScheme {
    /// Pure function of the owner's reconciled id and the role.
    pub fn derive(self, owner_target_id: &str, role: SyntheticRole) -> String {
        match self {
            SyntheticScheme::Suffix => format!("{}{}", owner_target_id, role.suffix()),
            SyntheticScheme::PrefixSwap {
                start_prefix,
                end_prefix,
            } => {
                let tail = owner_target_id
                    .split_once("::")
                    .map_or(owner_target_id, |(_, tail)| tail);
                let prefix = match role {
                    SyntheticRole::LoopStart => start_prefix,
                    SyntheticRole::LoopEnd => end_prefix,
                };
                format!("{}::{}", prefix, tail)
            }
        }
    }
}

/// Complete id-generation policy for one target platform.
#[derive(Debug, Clone)]
pub struct IdPolicy {
    pub roles: Option<RoleIds>,
    pub strategy: IdStrategy,
    pub synthetic: SyntheticScheme,
}

/// Produces fresh target ids under an `IdPolicy`. Deterministic for a given seed.
pub struct IdGenerator {
    policy: IdPolicy,
    rng: StdRng,
    used: AHashSet<String>,
    counter: u64,
    start_taken: bool,
    end_taken: bool,
}

impl IdGenerator {
    pub fn new(policy: IdPolicy, seed: u64) -> Self {
        let mut used = AHashSet::new();
        if let Some(roles) = &policy.roles {
            used.insert(roles.start.clone());
            used.insert(roles.end.clone());
        }
        let counter = match policy.strategy {
            IdStrategy::Counter { base } => base,
            IdStrategy::CollisionCheckedRandom { .. } => 0,
        };
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
            used,
            counter,
            start_taken: false,
            end_taken: false,
        }
    }

    pub fn policy(&self) -> &IdPolicy {
        &self.policy
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Marks an externally derived id (e.g. a synthetic boundary id) as taken.
    pub fn claim(&mut self, id: &str) -> bool {
        self.used.insert(id.to_string())
    }

    /// A fresh id for a node of `kind`.
    pub fn next_id(&mut self, kind: NodeKind) -> String {
        if let Some(id) = self.role_id(kind) {
            return id;
        }
        match self.policy.strategy {
            IdStrategy::Counter { .. } => self.next_counter(),
            IdStrategy::CollisionCheckedRandom {
                format,
                max_attempts,
            } => self.next_random(max_attempts, |rng| match format {
                RandomIdFormat::Timestamp { base_millis } => {
                    (base_millis + rng.random_range(0..1_000_000u64)).to_string()
                }
                RandomIdFormat::PrefixedUuid { prefix } => {
                    format!("{}::{}", prefix(kind), random_uuid(rng))
                }
            }),
        }
    }

    /// A fresh `<prefix>::<uuid>` id, used for generated branch and intent ports.
    pub fn next_prefixed(&mut self, prefix: &str) -> String {
        let max_attempts = match self.policy.strategy {
            IdStrategy::CollisionCheckedRandom { max_attempts, .. } => max_attempts,
            IdStrategy::Counter { .. } => 1,
        };
        self.next_random(max_attempts, |rng| format!("{}::{}", prefix, random_uuid(rng)))
    }

    fn role_id(&mut self, kind: NodeKind) -> Option<String> {
        let roles = self.policy.roles.as_ref()?;
        match kind {
            NodeKind::Start if !self.start_taken => {
                self.start_taken = true;
                Some(roles.start.clone())
            }
            NodeKind::End if !self.end_taken => {
                self.end_taken = true;
                Some(roles.end.clone())
            }
            _ => None,
        }
    }

    fn next_counter(&mut self) -> String {
        loop {
            let candidate = self.counter.to_string();
            self.counter += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    fn next_random<F>(&mut self, max_attempts: u32, mut candidate: F) -> String
    where
        F: FnMut(&mut StdRng) -> String,
    {
        for _ in 0..max_attempts.max(1) {
            let id = candidate(&mut self.rng);
            if self.used.insert(id.clone()) {
                return id;
            }
        }
        tracing::warn!(
            attempts = max_attempts,
            "random id space exhausted, falling back to a nanosecond id"
        );
        self.nanosecond_id()
    }

    fn nanosecond_id(&mut self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut bump = 0u128;
        loop {
            let id = (nanos + bump).to_string();
            if self.used.insert(id.clone()) {
                return id;
            }
            bump += 1;
        }
    }
}

fn random_uuid(rng: &mut StdRng) -> uuid::Uuid {
    uuid::Builder::from_random_bytes(rng.random::<[u8; 16]>()).into_uuid()
}

/// Current wall-clock time in milliseconds, used as the default timestamp base.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
