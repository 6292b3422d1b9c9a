//! Decision Bridge
//!
//! Sits between controller output and environment input: resolves the
//! effective decision (a manual override replaces the policy's decision
//! outright), publishes it to the decision registers, and forwards the
//! action to the environment. The bridge keeps no state of its own.

use tracing::{debug, info};

use lader_core::decision::validate_action;
use lader_core::mapping;
use lader_core::{Decision, Result, SharedRegisterStore};

use crate::env::{Environment, StepResult};

/// Translator from decisions to register writes and environment steps
#[derive(Debug, Clone)]
pub struct DecisionBridge {
    store: SharedRegisterStore,
}

impl DecisionBridge {
    pub fn new(store: SharedRegisterStore) -> Self {
        Self { store }
    }

    /// Effective decision: the override when present, otherwise the policy's
    pub fn apply(decision: &Decision, override_decision: Option<&Decision>) -> Decision {
        match override_decision {
            Some(manual) => {
                if manual.action != decision.action {
                    info!(
                        policy_action = decision.action,
                        override_action = manual.action,
                        "Manual override replaces policy decision"
                    );
                }
                manual.clone()
            }
            None => decision.clone(),
        }
    }

    /// Write the decision and its confidence into the store
    pub fn publish(&self, decision: &Decision) -> Result<()> {
        self.store
            .write(mapping::AI_DECISION, f64::from(decision.action))?;
        self.store
            .write(mapping::AI_CONFIDENCE, decision.confidence)?;
        debug!(
            action = decision.action,
            confidence = decision.confidence,
            "Decision published"
        );
        Ok(())
    }

    /// Step the environment with the decision's action
    pub fn forward<E: Environment + ?Sized>(&self, env: &mut E, decision: &Decision) -> Result<StepResult> {
        env.step(i64::from(decision.action))
    }

    /// apply, publish, then forward. Returns the decision that took effect.
    pub fn dispatch<E: Environment + ?Sized>(
        &self,
        env: &mut E,
        decision: &Decision,
        override_decision: Option<&Decision>,
    ) -> Result<(Decision, StepResult)> {
        let effective = Self::apply(decision, override_decision);
        validate_action(i64::from(effective.action))?;
        self.publish(&effective)?;
        let result = self.forward(env, &effective)?;
        Ok((effective, result))
    }

    pub fn store(&self) -> &SharedRegisterStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lader_core::{LaderError, RegisterStore};

    use crate::env::{EnvConfig, FactoryEnergyEnv};

    fn setup() -> (DecisionBridge, FactoryEnergyEnv) {
        let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
        let env = FactoryEnergyEnv::new(EnvConfig::default(), Arc::clone(&store)).unwrap();
        (DecisionBridge::new(store), env)
    }

    #[test]
    fn test_override_wins() {
        let policy = Decision::new(7, 0.9).unwrap();
        let manual = Decision::new(0, 1.0).unwrap();

        assert_eq!(DecisionBridge::apply(&policy, Some(&manual)), manual);
        assert_eq!(DecisionBridge::apply(&policy, None), policy);
    }

    #[test]
    fn test_publish_writes_decision_registers() {
        let (bridge, _env) = setup();
        bridge.publish(&Decision::new(5, 0.734).unwrap()).unwrap();

        let store = bridge.store();
        assert_eq!(store.read(mapping::AI_DECISION).unwrap(), 5.0);
        assert!((store.read(mapping::AI_CONFIDENCE).unwrap() - 0.734).abs() < 1e-9);
    }

    #[test]
    fn test_publish_without_decision_registers_fails() {
        let bridge = DecisionBridge::new(Arc::new(RegisterStore::new()));
        let result = bridge.publish(&Decision::new(1, 0.5).unwrap());
        assert!(matches!(result, Err(LaderError::UnknownRegister(200))));
    }

    #[test]
    fn test_dispatch_forwards_effective_action() {
        let (bridge, mut env) = setup();
        env.reset(2).unwrap();

        let policy = Decision::new(7, 0.6).unwrap();
        let manual = Decision::new(1, 1.0).unwrap();
        let (effective, result) = bridge.dispatch(&mut env, &policy, Some(&manual)).unwrap();

        assert_eq!(effective.action, 1);
        assert_eq!(result.info.action, 1);
        assert_eq!(bridge.store().read(mapping::AI_DECISION).unwrap(), 1.0);
    }

    #[test]
    fn test_dispatch_rejects_action_before_publishing() {
        let (bridge, mut env) = setup();
        env.reset(2).unwrap();
        bridge.publish(&Decision::new(3, 0.5).unwrap()).unwrap();

        let bogus = Decision {
            action: 200,
            confidence: 0.9,
            timestamp: chrono::Utc::now(),
        };
        let result = bridge.dispatch(&mut env, &bogus, None);

        assert!(matches!(result, Err(LaderError::InvalidAction(200))));
        assert_eq!(bridge.store().read(mapping::AI_DECISION).unwrap(), 3.0);
        assert_eq!(env.state().elapsed_steps, 0);
    }
}
