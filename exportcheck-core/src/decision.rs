//! # Decision Functions
//!
//! Scripts how the simulated receiver answers each delivery attempt.
//! A decision function is consulted once per attempt (a retried batch asks
//! again) and returns a [`DecisionOutcome`].
//!
//! ## Models:
//! - `AlwaysSucceed`: every attempt is accepted.
//! - `RandomDecision`: probability-driven, owns its own seedable RNG.
//! - `ScriptedDecision`: replays a fixed sequence of outcomes.
//! - `PermanentForIds` / `TransientForIds`: keyed on the ids in the batch.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ids::IdSet;

/// Result of one simulated delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Success,
    /// Retryable; the sender is expected to resend the same batch.
    TransientFailure,
    /// Terminal; the batch is dropped and must not be resent.
    PermanentFailure,
}

/// Trait for receiver decision strategies.
pub trait DecisionFunction: Send + Sync {
    /// Decide the outcome for one attempt carrying `batch`.
    fn decide(&self, batch: &IdSet) -> DecisionOutcome;
}

impl<F> DecisionFunction for F
where
    F: Fn(&IdSet) -> DecisionOutcome + Send + Sync,
{
    fn decide(&self, batch: &IdSet) -> DecisionOutcome {
        self(batch)
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSucceed;

impl DecisionFunction for AlwaysSucceed {
    #[inline]
    fn decide(&self, _batch: &IdSet) -> DecisionOutcome {
        DecisionOutcome::Success
    }
}

/// Failure probabilities of a [`RandomDecision`]. Success takes the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeWeights {
    pub transient: f64,
    pub permanent: f64,
}

impl OutcomeWeights {
    pub const NONE: Self = Self {
        transient: 0.0,
        permanent: 0.0,
    };
    pub const HALF_TRANSIENT: Self = Self {
        transient: 0.5,
        permanent: 0.0,
    };
    pub const HALF_PERMANENT: Self = Self {
        transient: 0.0,
        permanent: 0.5,
    };
    pub const THIRDS: Self = Self {
        transient: 1.0 / 3.0,
        permanent: 1.0 / 3.0,
    };

    /// Probability of a successful attempt.
    pub fn success(&self) -> f64 {
        1.0 - self.transient - self.permanent
    }
}

/// Probability-driven decision with an independent RNG per instance.
#[derive(Debug)]
pub struct RandomDecision {
    weights: OutcomeWeights,
    rng: Mutex<SmallRng>,
}

impl RandomDecision {
    /// Creates a decision seeded from OS entropy.
    ///
    /// # Panics
    /// Panics if the weights are negative or sum above 1.0.
    pub fn new(weights: OutcomeWeights) -> Self {
        Self::with_rng(weights, SmallRng::from_rng(&mut rand::rng()))
    }

    /// Creates a reproducible decision.
    ///
    /// # Panics
    /// Panics if the weights are negative or sum above 1.0.
    pub fn seeded(weights: OutcomeWeights, seed: u64) -> Self {
        Self::with_rng(weights, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(weights: OutcomeWeights, rng: SmallRng) -> Self {
        assert!(
            weights.transient >= 0.0 && weights.permanent >= 0.0 && weights.success() >= -1e-9,
            "Outcome weights must be non-negative and sum to at most 1.0"
        );
        Self {
            weights,
            rng: Mutex::new(rng),
        }
    }

    pub fn weights(&self) -> OutcomeWeights {
        self.weights
    }
}

impl DecisionFunction for RandomDecision {
    fn decide(&self, _batch: &IdSet) -> DecisionOutcome {
        let r: f64 = self.rng.lock().random();
        if r < self.weights.permanent {
            DecisionOutcome::PermanentFailure
        } else if r < self.weights.permanent + self.weights.transient {
            DecisionOutcome::TransientFailure
        } else {
            DecisionOutcome::Success
        }
    }
}

/// Replays a fixed outcome sequence, then answers with `fallback`.
#[derive(Debug)]
pub struct ScriptedDecision {
    script: Mutex<VecDeque<DecisionOutcome>>,
    fallback: DecisionOutcome,
}

impl ScriptedDecision {
    pub fn new(script: impl IntoIterator<Item = DecisionOutcome>, fallback: DecisionOutcome) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
        }
    }

    /// Outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl DecisionFunction for ScriptedDecision {
    fn decide(&self, _batch: &IdSet) -> DecisionOutcome {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

/// Fails permanently whenever the batch carries one of the listed ids.
#[derive(Debug, Clone)]
pub struct PermanentForIds {
    ids: IdSet,
}

impl PermanentForIds {
    pub fn new(ids: IdSet) -> Self {
        Self { ids }
    }
}

impl DecisionFunction for PermanentForIds {
    fn decide(&self, batch: &IdSet) -> DecisionOutcome {
        if batch.iter().any(|id| self.ids.contains(id)) {
            DecisionOutcome::PermanentFailure
        } else {
            DecisionOutcome::Success
        }
    }
}

/// Fails transiently for the listed ids until each has been refused
/// `failures_per_id` times.
#[derive(Debug)]
pub struct TransientForIds {
    ids: IdSet,
    failures_per_id: u32,
    refused: Mutex<std::collections::HashMap<crate::ids::UniqueId, u32>>,
}

impl TransientForIds {
    pub fn new(ids: IdSet, failures_per_id: u32) -> Self {
        Self {
            ids,
            failures_per_id,
            refused: Mutex::new(Default::default()),
        }
    }
}

impl DecisionFunction for TransientForIds {
    fn decide(&self, batch: &IdSet) -> DecisionOutcome {
        let mut refused = self.refused.lock();
        let mut refuse = false;
        for id in batch.iter().filter(|id| self.ids.contains(id)) {
            let count = refused.entry(id.clone()).or_default();
            if *count < self.failures_per_id {
                *count += 1;
                refuse = true;
            }
        }
        if refuse {
            DecisionOutcome::TransientFailure
        } else {
            DecisionOutcome::Success
        }
    }
}

/// The fixed scenario menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    AlwaysSucceed,
    RandomTransient,
    RandomPermanent,
    RandomMixed,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::AlwaysSucceed,
        ScenarioKind::RandomTransient,
        ScenarioKind::RandomPermanent,
        ScenarioKind::RandomMixed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::AlwaysSucceed => "always_succeed",
            ScenarioKind::RandomTransient => "random_transient",
            ScenarioKind::RandomPermanent => "random_permanent",
            ScenarioKind::RandomMixed => "random_mixed",
        }
    }

    pub fn weights(&self) -> OutcomeWeights {
        match self {
            ScenarioKind::AlwaysSucceed => OutcomeWeights::NONE,
            ScenarioKind::RandomTransient => OutcomeWeights::HALF_TRANSIENT,
            ScenarioKind::RandomPermanent => OutcomeWeights::HALF_PERMANENT,
            ScenarioKind::RandomMixed => OutcomeWeights::THIRDS,
        }
    }

    /// Builds a fresh decision function for one scenario run.
    pub fn decision(&self, seed: Option<u64>) -> Arc<dyn DecisionFunction> {
        match (self, seed) {
            (ScenarioKind::AlwaysSucceed, _) => Arc::new(AlwaysSucceed),
            (kind, Some(seed)) => Arc::new(RandomDecision::seeded(kind.weights(), seed)),
            (kind, None) => Arc::new(RandomDecision::new(kind.weights())),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}
