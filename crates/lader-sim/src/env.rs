//! Factory Energy Environment
//!
//! Gym-style state machine over the factory floor:
//! - reset(seed) -> observation
//! - step(action) -> (observation, reward, terminated, truncated, info)
//!
//! Given a seed and an action sequence, every transition is deterministic.
//! The environment is the only place an action index becomes per-class
//! commands, and it publishes each new state into the register store so
//! monitors and the I/O bridge see it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lader_core::decision::validate_action;
use lader_core::mapping;
use lader_core::{LaderError, Result, SharedRegisterStore, ACTION_COUNT};

use crate::machine::{FactorySpec, MachineClass, ModelParams};
use crate::plant::{Plant, PlantReading, SimulatedPlant};
use crate::state::{
    ActionTable, Commands, FactoryState, Observation, ObservationBounds, Reward, OBSERVATION_DIM,
};

/// Simulation timing and noise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed used when the caller does not pick one
    pub seed: u64,
    /// Length of one tick in seconds
    pub dt_seconds: f64,
    /// Steps per episode before truncation
    pub episode_horizon: u64,
    /// Jitter standard deviation as a fraction of max_power
    pub noise_fraction: f64,
    /// Machine response time constant in seconds
    pub response_time_s: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            dt_seconds: 1.0,
            episode_horizon: 3600,
            noise_fraction: 0.01,
            response_time_s: 1.0,
        }
    }
}

impl SimulationConfig {
    pub fn dt_hours(&self) -> f64 {
        self.dt_seconds / 3600.0
    }
}

/// Reward shaping weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Divides total power (kW) in the power penalty
    pub power_normalization: f64,
    /// Weight of the load standard deviation penalty
    pub imbalance_weight: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            power_normalization: 40.0,
            imbalance_weight: 0.1,
        }
    }
}

impl RewardConfig {
    /// `-(total_power / normalization) - weight * load_imbalance`
    pub fn reward(&self, total_power: f64, load_imbalance: f64) -> Reward {
        -(total_power / self.power_normalization) - self.imbalance_weight * load_imbalance
    }
}

/// Everything needed to build an environment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub simulation: SimulationConfig,
    pub reward: RewardConfig,
    pub machines: FactorySpec,
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        use LaderError::Config;

        let sim = &self.simulation;
        if !(sim.dt_seconds.is_finite() && sim.dt_seconds > 0.0) {
            return Err(Config("simulation.dt_seconds must be positive".into()));
        }
        if sim.episode_horizon == 0 {
            return Err(Config("simulation.episode_horizon must be at least 1".into()));
        }
        if !(sim.noise_fraction >= 0.0 && sim.noise_fraction <= 0.1) {
            return Err(Config("simulation.noise_fraction must be in [0, 0.1]".into()));
        }
        if !(sim.response_time_s.is_finite() && sim.response_time_s >= 0.0) {
            return Err(Config("simulation.response_time_s must be >= 0".into()));
        }
        if !(self.reward.power_normalization.is_finite() && self.reward.power_normalization > 0.0) {
            return Err(Config("reward.power_normalization must be positive".into()));
        }
        if !(self.reward.imbalance_weight.is_finite() && self.reward.imbalance_weight >= 0.0) {
            return Err(Config("reward.imbalance_weight must be >= 0".into()));
        }
        self.machines.validate()
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            noise_fraction: self.simulation.noise_fraction,
            response_time_s: self.simulation.response_time_s,
        }
    }
}

/// Additional information about a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub action: u8,
    pub action_name: String,
    pub commands: Commands,
    pub load_imbalance: f64,
    /// Units that drew inrush current this tick
    pub surge_units: usize,
    pub elapsed_steps: u64,
    pub state: FactoryState,
}

/// Result of a single environment step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: Reward,
    /// Always false: the factory has no natural terminal state
    pub terminated: bool,
    /// True once the step budget is spent
    pub truncated: bool,
    pub info: StepInfo,
}

/// Capability interface consumed by external trainers
pub trait Environment {
    fn reset(&mut self, seed: u64) -> Result<Observation>;

    fn step(&mut self, action: i64) -> Result<StepResult>;

    fn observation_dim(&self) -> usize {
        OBSERVATION_DIM
    }

    fn action_count(&self) -> usize {
        ACTION_COUNT
    }
}

/// The factory energy environment
pub struct FactoryEnergyEnv {
    config: EnvConfig,
    actions: ActionTable,
    plant: Box<dyn Plant>,
    store: SharedRegisterStore,
    bounds: ObservationBounds,
    state: FactoryState,
    seed: u64,
}

impl FactoryEnergyEnv {
    /// Create an environment over the simulated plant
    pub fn new(config: EnvConfig, store: SharedRegisterStore) -> Result<Self> {
        config.validate()?;
        let plant = SimulatedPlant::new(&config.machines, config.model_params())?;
        Self::with_plant(config, store, Box::new(plant))
    }

    /// Create an environment over any plant
    pub fn with_plant(config: EnvConfig, store: SharedRegisterStore, plant: Box<dyn Plant>) -> Result<Self> {
        config.validate()?;
        if plant.publishes_state() {
            check_register_capacity(&config, &store)?;
        }
        let bounds = ObservationBounds::new(
            &config.machines,
            config.simulation.episode_horizon,
            config.simulation.dt_hours(),
            config.reward.power_normalization,
            config.reward.imbalance_weight,
        );
        let seed = config.simulation.seed;

        Ok(Self {
            config,
            actions: ActionTable::standard(),
            plant,
            store,
            bounds,
            state: FactoryState::default(),
            seed,
        })
    }

    /// Replace the action table
    pub fn with_action_table(mut self, actions: ActionTable) -> Self {
        self.actions = actions;
        self
    }

    /// Start a new episode: near-idle machines, zero energy, zero steps
    pub fn reset(&mut self, seed: u64) -> Result<Observation> {
        self.seed = seed;
        let readings = self.plant.reset(seed)?;

        let mut state = FactoryState::default();
        self.apply_readings(&mut state, &readings);
        self.publish(&state)?;
        self.state = state;

        info!(
            seed,
            plant = self.plant.name(),
            total_power = self.state.total_power,
            "Episode reset"
        );
        Ok(self.observation())
    }

    /// Advance the factory one tick under the given action
    pub fn step(&mut self, action: i64) -> Result<StepResult> {
        let index = validate_action(action)?;
        let entry = self.actions.entries()[usize::from(index)];
        let dt_seconds = self.config.simulation.dt_seconds;

        let readings = self.plant.advance(&entry.commands, dt_seconds)?;

        let mut next = self.state.clone();
        self.apply_readings(&mut next, &readings);

        let load_imbalance = next.load_imbalance();
        let reward = self.config.reward.reward(next.total_power, load_imbalance);

        next.cumulative_energy += next.total_power * self.config.simulation.dt_hours();
        next.elapsed_steps += 1;
        next.last_reward = reward;

        let truncated = next.elapsed_steps >= self.config.simulation.episode_horizon;
        let surge_units = readings.iter().map(|r| r.surge_units).sum();

        // Registers first: a failed write leaves the previous state in place
        self.publish(&next)?;
        self.state = next;

        debug!(
            action,
            total_power = self.state.total_power,
            reward,
            surge_units,
            step = self.state.elapsed_steps,
            "Environment step"
        );
        if self.state.elapsed_steps == self.config.simulation.episode_horizon {
            info!(
                steps = self.state.elapsed_steps,
                energy_kwh = self.state.cumulative_energy,
                "Episode horizon reached"
            );
        }

        Ok(StepResult {
            observation: self.observation(),
            reward,
            terminated: false,
            truncated,
            info: StepInfo {
                action: index,
                action_name: entry.name.to_string(),
                commands: entry.commands,
                load_imbalance,
                surge_units,
                elapsed_steps: self.state.elapsed_steps,
                state: self.state.clone(),
            },
        })
    }

    fn apply_readings(&self, state: &mut FactoryState, readings: &PlantReading) {
        let [conveyor, pusher, robot] = *readings;

        state.conveyor_power = conveyor.power;
        state.pusher_power = pusher.power;
        state.robot_power = robot.power;
        state.total_power = conveyor.power + pusher.power + robot.power;
        state.conveyor_load = conveyor.load;
        state.pusher_load = pusher.load;
        state.robot_load = robot.load;
        state.system_efficiency = self.system_efficiency(readings, state.total_power);
    }

    /// Share of total draw doing useful work, in percent
    fn system_efficiency(&self, readings: &PlantReading, total_power: f64) -> f64 {
        if total_power <= 0.0 {
            return 0.0;
        }
        let useful: f64 = MachineClass::ALL
            .iter()
            .map(|class| {
                let spec = self.config.machines.get(*class);
                let active = (readings[class.index()].power - spec.class_idle_power()).max(0.0);
                active * spec.efficiency
            })
            .sum();
        (useful / total_power * 100.0).clamp(0.0, 100.0)
    }

    /// Write a state into the holding registers, all of them or none
    fn publish(&self, s: &FactoryState) -> Result<()> {
        if !self.plant.publishes_state() {
            return Ok(());
        }
        self.store.write_many(&[
            (mapping::CONVEYOR_POWER, s.conveyor_power),
            (mapping::PUSHER_POWER, s.pusher_power),
            (mapping::ROBOT_POWER, s.robot_power),
            (mapping::TOTAL_POWER, s.total_power),
            (mapping::CONVEYOR_LOAD, s.conveyor_load),
            (mapping::PUSHER_LOAD, s.pusher_load),
            (mapping::ROBOT_LOAD, s.robot_load),
            (mapping::SYSTEM_EFFICIENCY, s.system_efficiency),
            (mapping::TOTAL_ENERGY, s.cumulative_energy),
        ])
    }

    /// Observation of the current state
    pub fn observation(&self) -> Observation {
        Observation::from_state(
            &self.state,
            self.config.simulation.episode_horizon,
            &self.bounds,
        )
    }

    pub fn state(&self) -> &FactoryState {
        &self.state
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn action_table(&self) -> &ActionTable {
        &self.actions
    }

    pub fn bounds(&self) -> &ObservationBounds {
        &self.bounds
    }

    pub fn store(&self) -> &SharedRegisterStore {
        &self.store
    }

    /// Seed of the current episode
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn plant_name(&self) -> &str {
        self.plant.name()
    }
}

/// Reject machine ratings the state registers could never hold.
///
/// Registers missing from the store are left to fail on first publish.
fn check_register_capacity(config: &EnvConfig, store: &SharedRegisterStore) -> Result<()> {
    let machines = &config.machines;
    let horizon_hours = config.simulation.episode_horizon as f64 * config.simulation.dt_hours();
    let peaks = [
        (mapping::CONVEYOR_POWER, machines.conveyor.class_max_power()),
        (mapping::PUSHER_POWER, machines.pusher.class_max_power()),
        (mapping::ROBOT_POWER, machines.pick_place.class_max_power()),
        (mapping::TOTAL_POWER, machines.total_max_power()),
        (mapping::TOTAL_ENERGY, machines.total_max_power() * horizon_hours),
    ];

    for (address, peak) in peaks {
        if !store.contains(address) {
            continue;
        }
        let (_, high) = store.range(address)?;
        if peak > high {
            return Err(LaderError::Config(format!(
                "machines can reach {peak:.1} but register {address} holds at most {high:.1}"
            )));
        }
    }
    Ok(())
}

impl Environment for FactoryEnergyEnv {
    fn reset(&mut self, seed: u64) -> Result<Observation> {
        FactoryEnergyEnv::reset(self, seed)
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        FactoryEnergyEnv::step(self, action)
    }
}
