//! Integration tests for the factory energy environment
//!
//! These tests verify the model, environment, bridge, and runner work
//! correctly together over whole episodes.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::float_cmp)]

use std::sync::Arc;

use lader_core::{mapping, Decision, LaderError, RegisterStore};
use lader_sim::{
    compare, DecisionBridge, EnvConfig, Environment, EpisodeRunner, FactoryEnergyEnv,
    FactorySpec, FixedPolicy, RandomPolicy, RegisterPlant, ScriptedPolicy, OBSERVATION_DIM,
};

/// Helper function to create an environment over the default mapping
fn create_env() -> FactoryEnergyEnv {
    let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
    FactoryEnergyEnv::new(EnvConfig::default(), store).unwrap()
}

#[test]
fn test_bounds_hold_for_every_action() {
    let mut env = create_env();
    let max_total = FactorySpec::default().total_max_power();

    for action in 0..8 {
        env.reset(action as u64).unwrap();
        for _ in 0..30 {
            let result = env.step(action).unwrap();
            let state = &result.info.state;

            assert!(state.total_power >= 0.0 && state.total_power <= max_total);
            for load in state.loads() {
                assert!((0.0..=100.0).contains(&load), "action {action}: load {load}");
            }
            assert!(result.reward <= 0.0);
        }
    }
}

#[test]
fn test_same_seed_same_rewards() {
    let actions = [7, 0, 3, 5, 6, 1, 2, 4, 7, 7, 0, 6];

    let run = || {
        let mut env = create_env();
        env.reset(42).unwrap();
        actions
            .iter()
            .map(|a| env.step(*a).unwrap().reward)
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}

#[test]
fn test_different_seeds_differ() {
    let mut a = create_env();
    let mut b = create_env();
    a.reset(1).unwrap();
    b.reset(2).unwrap();

    assert_ne!(a.step(5).unwrap().reward, b.step(5).unwrap().reward);
}

#[test]
fn test_idle_reward_beats_full_reward() {
    let mut idle = create_env();
    let mut full = create_env();
    idle.reset(7).unwrap();
    full.reset(7).unwrap();

    for _ in 0..10 {
        let idle_reward = idle.step(0).unwrap().reward;
        let full_reward = full.step(7).unwrap().reward;
        assert!(idle_reward >= full_reward);
    }
}

#[test]
fn test_energy_monotonic_and_reset() {
    let mut env = create_env();
    env.reset(11).unwrap();

    let mut previous = 0.0;
    for i in 0..50 {
        env.step(i % 8).unwrap();
        let energy = env.state().cumulative_energy;
        assert!(energy >= previous);
        previous = energy;
    }
    assert!(previous > 0.0);

    env.reset(11).unwrap();
    assert_eq!(env.state().cumulative_energy, 0.0);
    assert_eq!(env.state().elapsed_steps, 0);
}

#[test]
fn test_full_parallel_reaches_rating() {
    let mut env = create_env();
    env.reset(1).unwrap();

    let mut last = 0.0;
    for _ in 0..10 {
        last = env.step(7).unwrap().info.state.total_power;
    }
    assert!((last - 476.0).abs() / 476.0 < 0.05, "total {last}");
}

#[test]
fn test_all_idle_stays_near_baseline() {
    let mut env = create_env();
    env.reset(1).unwrap();
    let baseline = FactorySpec::default().idle_baseline();

    let mut sum = 0.0;
    for _ in 0..10 {
        let total = env.step(0).unwrap().info.state.total_power;
        assert!(total > 0.0);
        // Jitter is truncated at 3 sigma per unit
        assert!(total <= 23.88, "total {total}");
        sum += total;
    }
    let mean = sum / 10.0;
    assert!((mean - baseline).abs() / baseline < 0.3, "mean {mean}");
}

#[test]
fn test_invalid_actions_rejected() {
    let mut env = create_env();
    env.reset(0).unwrap();

    assert!(matches!(env.step(8), Err(LaderError::InvalidAction(8))));
    assert!(matches!(env.step(-1), Err(LaderError::InvalidAction(-1))));
}

#[test]
fn test_trainer_interface() {
    fn drive(env: &mut dyn Environment) -> usize {
        let obs = env.reset(3).unwrap();
        assert_eq!(obs.as_slice().len(), env.observation_dim());
        let last_action = env.action_count() as i64 - 1;
        env.step(last_action).unwrap();
        env.observation_dim()
    }

    let mut env = create_env();
    assert_eq!(drive(&mut env), OBSERVATION_DIM);
    assert_eq!(env.action_count(), 8);
}

#[test]
fn test_truncation_keeps_reporting() {
    let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
    let mut config = EnvConfig::default();
    config.simulation.episode_horizon = 4;
    let mut env = FactoryEnergyEnv::new(config, store).unwrap();
    env.reset(0).unwrap();

    let flags: Vec<bool> = (0..6).map(|_| env.step(1).unwrap().truncated).collect();
    assert_eq!(flags, vec![false, false, false, true, true, true]);
}

#[test]
fn test_override_wins_through_bridge() {
    let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
    let mut env = FactoryEnergyEnv::new(EnvConfig::default(), Arc::clone(&store)).unwrap();
    let bridge = DecisionBridge::new(Arc::clone(&store));
    env.reset(4).unwrap();

    let policy = Decision::new(7, 0.95).unwrap();
    let manual = Decision::new(0, 1.0).unwrap();
    let (effective, result) = bridge.dispatch(&mut env, &policy, Some(&manual)).unwrap();

    assert_eq!(effective, manual);
    assert_eq!(result.info.action, 0);
    assert_eq!(store.read(mapping::AI_DECISION).unwrap(), 0.0);
    assert!((store.read(mapping::AI_CONFIDENCE).unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn test_staggered_beats_full_parallel_on_energy() {
    let mut baseline_runner = EpisodeRunner::new(create_env());
    let mut optimized_runner = EpisodeRunner::new(create_env());

    let baseline = baseline_runner
        .run(&mut FixedPolicy::new(7).unwrap(), 42, 200)
        .unwrap();
    let optimized = optimized_runner
        .run(&mut ScriptedPolicy::staggered(), 42, 200)
        .unwrap();

    let comparison = compare(&baseline, &optimized);
    assert!(comparison.energy_savings_pct > 0.0);
    assert!(comparison.power_reduction_pct > 0.0);
}

#[test]
fn test_random_policy_episode_is_reproducible() {
    let mut a = EpisodeRunner::new(create_env());
    let mut b = EpisodeRunner::new(create_env());

    let stats_a = a.run(&mut RandomPolicy::new(9), 9, 100).unwrap();
    let stats_b = b.run(&mut RandomPolicy::new(9), 9, 100).unwrap();

    assert_eq!(stats_a.total_reward, stats_b.total_reward);
    assert_eq!(stats_a.total_energy_kwh, stats_b.total_energy_kwh);
    assert_ne!(stats_a.episode_id, stats_b.episode_id);
}

#[test]
fn test_live_plant_does_not_publish_state() {
    let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
    // Device feed owns the state registers
    store.write(mapping::CONVEYOR_POWER, 200.0).unwrap();
    store.write(mapping::PUSHER_POWER, 30.0).unwrap();
    store.write(mapping::ROBOT_POWER, 20.0).unwrap();
    store.write(mapping::TOTAL_POWER, 999.0).unwrap();

    let plant = RegisterPlant::new(Arc::clone(&store), &FactorySpec::default());
    let mut env =
        FactoryEnergyEnv::with_plant(EnvConfig::default(), Arc::clone(&store), Box::new(plant))
            .unwrap();
    env.reset(0).unwrap();
    let result = env.step(7).unwrap();

    assert!((result.info.state.total_power - 250.0).abs() < 1e-6);
    assert!((store.read(mapping::TOTAL_POWER).unwrap() - 999.0).abs() < 1e-9);
    assert_eq!(env.plant_name(), "registers");
}
