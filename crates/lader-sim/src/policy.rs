//! Controllers that turn observations into decisions
//!
//! The learning controller itself lives outside this crate; these are the
//! deterministic and seeded baselines used for runs and comparisons.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use lader_core::decision::validate_action;
use lader_core::{Decision, LaderError, Result, ACTION_COUNT};

use crate::state::Observation;

/// Black-box controller capability
pub trait Policy: Send {
    /// Policy name
    fn name(&self) -> &str;

    /// Pick the decision for the next step
    fn decide(&mut self, observation: &Observation) -> Result<Decision>;

    /// Called when an episode starts
    fn reset(&mut self) {}
}

/// Always the same action, full confidence
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    action: u8,
}

impl FixedPolicy {
    pub fn new(action: i64) -> Result<Self> {
        Ok(Self {
            action: validate_action(action)?,
        })
    }

    pub fn action(&self) -> u8 {
        self.action
    }
}

impl Policy for FixedPolicy {
    fn name(&self) -> &str {
        "fixed"
    }

    fn decide(&mut self, _observation: &Observation) -> Result<Decision> {
        Decision::new(i64::from(self.action), 1.0)
    }
}

/// Cycles through a fixed action sequence
#[derive(Debug, Clone)]
pub struct ScriptedPolicy {
    actions: Vec<u8>,
    cursor: usize,
    confidence: f64,
}

impl ScriptedPolicy {
    pub fn new(actions: &[i64]) -> Result<Self> {
        if actions.is_empty() {
            return Err(LaderError::Config(
                "scripted policy needs at least one action".into(),
            ));
        }
        let actions = actions
            .iter()
            .map(|a| validate_action(*a))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            actions,
            cursor: 0,
            confidence: 1.0,
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Staggered start: ramp the floor up class by class, then hold
    pub fn staggered() -> Self {
        Self {
            actions: vec![1, 6, 6, 5, 5, 6],
            cursor: 0,
            confidence: 0.8,
        }
    }
}

impl Policy for ScriptedPolicy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn decide(&mut self, _observation: &Observation) -> Result<Decision> {
        let action = self.actions[self.cursor % self.actions.len()];
        self.cursor += 1;
        Decision::new(i64::from(action), self.confidence)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Uniform random actions from a seeded source
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    seed: u64,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn decide(&mut self, _observation: &Observation) -> Result<Decision> {
        let action = self.rng.gen_range(0..ACTION_COUNT) as i64;
        Decision::new(action, 1.0 / ACTION_COUNT as f64)
    }

    fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs() -> Observation {
        Observation([0.0; 10])
    }

    #[test]
    fn test_fixed_policy() {
        let mut policy = FixedPolicy::new(7).unwrap();
        let decision = policy.decide(&obs()).unwrap();
        assert_eq!(decision.action, 7);
        assert_eq!(decision.confidence, 1.0);

        assert!(FixedPolicy::new(8).is_err());
    }

    #[test]
    fn test_scripted_policy_cycles() {
        let mut policy = ScriptedPolicy::new(&[1, 2, 3]).unwrap();
        let actions: Vec<u8> = (0..5).map(|_| policy.decide(&obs()).unwrap().action).collect();
        assert_eq!(actions, vec![1, 2, 3, 1, 2]);

        policy.reset();
        assert_eq!(policy.decide(&obs()).unwrap().action, 1);
    }

    #[test]
    fn test_scripted_policy_rejects_bad_script() {
        assert!(ScriptedPolicy::new(&[]).is_err());
        assert!(matches!(
            ScriptedPolicy::new(&[0, 9]),
            Err(LaderError::InvalidAction(9))
        ));
    }

    #[test]
    fn test_random_policy_is_seeded() {
        let mut a = RandomPolicy::new(42);
        let mut b = RandomPolicy::new(42);

        let seq_a: Vec<u8> = (0..20).map(|_| a.decide(&obs()).unwrap().action).collect();
        let seq_b: Vec<u8> = (0..20).map(|_| b.decide(&obs()).unwrap().action).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().all(|a| usize::from(*a) < ACTION_COUNT));

        a.reset();
        assert_eq!(a.decide(&obs()).unwrap().action, seq_a[0]);
    }
}
