//! Factory state, actions, and observations for the environment

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::warn;

use lader_core::decision::validate_action;
use lader_core::{LaderError, Result, ACTION_COUNT};

use crate::machine::{clamp_command, FactorySpec, MachineClass};

/// Reward value from the environment
pub type Reward = f64;

/// Length of the observation vector
pub const OBSERVATION_DIM: usize = 10;

/// Largest population standard deviation three values in [0, 100] can have
pub const MAX_LOAD_IMBALANCE: f64 = 47.140_452_079_103_17;

/// Per-class commanded intensity, each a fraction of the class rating
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Commands {
    pub conveyor: f64,
    pub pusher: f64,
    pub robot: f64,
}

impl Commands {
    /// Build a command triple, clamping each component into [0, 1]
    pub fn new(conveyor: f64, pusher: f64, robot: f64) -> Self {
        let clamped = Self {
            conveyor: clamp_command(conveyor),
            pusher: clamp_command(pusher),
            robot: clamp_command(robot),
        };
        if clamped != (Self { conveyor, pusher, robot }) {
            warn!(conveyor, pusher, robot, "Commands clamped into [0, 1]");
        }
        clamped
    }

    pub fn get(&self, class: MachineClass) -> f64 {
        match class {
            MachineClass::Conveyor => self.conveyor,
            MachineClass::Pusher => self.pusher,
            MachineClass::PickPlace => self.robot,
        }
    }

    fn is_valid(&self) -> bool {
        [self.conveyor, self.pusher, self.robot]
            .iter()
            .all(|c| c.is_finite() && (0.0..=1.0).contains(c))
    }
}

/// One row of the action table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActionEntry {
    pub name: &'static str,
    pub commands: Commands,
}

/// Fixed mapping from action index to a sequencing strategy.
///
/// Commands are fractions of each class's max_power, never raw power, so no
/// entry can ask a class for more than its rating.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTable {
    entries: [ActionEntry; ACTION_COUNT],
}

impl ActionTable {
    /// Build a table, checking every entry
    pub fn new(entries: [ActionEntry; ACTION_COUNT]) -> Result<Self> {
        for (index, entry) in entries.iter().enumerate() {
            if !entry.commands.is_valid() {
                return Err(LaderError::Config(format!(
                    "action {index} ({}) has a command outside [0, 1]",
                    entry.name
                )));
            }
        }
        Ok(Self { entries })
    }

    /// The standard staggering strategies
    pub fn standard() -> Self {
        let entry = |name, conveyor, pusher, robot| ActionEntry {
            name,
            commands: Commands {
                conveyor,
                pusher,
                robot,
            },
        };

        Self {
            entries: [
                entry("all_idle", 0.0, 0.0, 0.0),
                entry("conveyors_only", 1.0, 0.0, 0.0),
                entry("conveyors_pushers", 1.0, 1.0, 0.0),
                entry("conveyors_robots", 1.0, 0.0, 1.0),
                entry("low_rate_parallel", 0.3, 0.3, 0.3),
                entry("mid_rate_parallel", 0.6, 0.6, 0.6),
                entry("staggered_ramp", 0.8, 0.5, 0.3),
                entry("full_parallel", 1.0, 1.0, 1.0),
            ],
        }
    }

    /// Look up an action, rejecting indices outside the action space
    pub fn get(&self, action: i64) -> Result<&ActionEntry> {
        let index = validate_action(action)?;
        Ok(&self.entries[usize::from(index)])
    }

    pub fn entries(&self) -> &[ActionEntry; ACTION_COUNT] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        ACTION_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Mutable state of the factory environment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FactoryState {
    pub conveyor_power: f64,
    pub pusher_power: f64,
    pub robot_power: f64,
    pub total_power: f64,
    pub conveyor_load: f64,
    pub pusher_load: f64,
    pub robot_load: f64,
    pub system_efficiency: f64,
    /// kWh since reset; never decreases within an episode
    pub cumulative_energy: f64,
    pub elapsed_steps: u64,
    pub last_reward: Reward,
}

impl FactoryState {
    pub fn loads(&self) -> [f64; 3] {
        [self.conveyor_load, self.pusher_load, self.robot_load]
    }

    /// Population standard deviation of the three class loads
    pub fn load_imbalance(&self) -> f64 {
        let loads = self.loads();
        let mean = loads.iter().sum::<f64>() / 3.0;
        let variance = loads.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / 3.0;
        variance.sqrt()
    }

    /// Mean load across classes, used as the throughput figure in reports
    pub fn mean_load(&self) -> f64 {
        self.loads().iter().sum::<f64>() / 3.0
    }
}

/// Inclusive ranges each observation component is clamped to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationBounds {
    pub low: [f64; OBSERVATION_DIM],
    pub high: [f64; OBSERVATION_DIM],
}

impl ObservationBounds {
    pub fn new(
        spec: &FactorySpec,
        horizon: u64,
        dt_hours: f64,
        power_normalization: f64,
        imbalance_weight: f64,
    ) -> Self {
        let total_max = spec.total_max_power();
        let max_energy = total_max * horizon as f64 * dt_hours;
        let min_reward = -(total_max / power_normalization) - imbalance_weight * MAX_LOAD_IMBALANCE;

        Self {
            low: [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, min_reward],
            high: [
                spec.conveyor.class_max_power(),
                spec.pusher.class_max_power(),
                spec.pick_place.class_max_power(),
                total_max,
                100.0,
                100.0,
                100.0,
                1.0,
                max_energy,
                0.0,
            ],
        }
    }
}

/// Observation vector surfaced to the controller:
/// `[conveyor_power, pusher_power, robot_power, total_power, conveyor_load,
/// pusher_load, robot_load, elapsed_steps_normalized, cumulative_energy,
/// last_reward]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation(pub [f64; OBSERVATION_DIM]);

impl Observation {
    /// Build from state, clamping every component to its bounds
    pub fn from_state(state: &FactoryState, horizon: u64, bounds: &ObservationBounds) -> Self {
        let normalized_steps = if horizon == 0 {
            1.0
        } else {
            state.elapsed_steps as f64 / horizon as f64
        };

        let raw = [
            state.conveyor_power,
            state.pusher_power,
            state.robot_power,
            state.total_power,
            state.conveyor_load,
            state.pusher_load,
            state.robot_load,
            normalized_steps,
            state.cumulative_energy,
            state.last_reward,
        ];

        let mut values = [0.0; OBSERVATION_DIM];
        for (i, value) in raw.iter().enumerate() {
            values[i] = if value.is_nan() {
                bounds.low[i]
            } else {
                value.clamp(bounds.low[i], bounds.high[i])
            };
        }
        Self(values)
    }

    pub fn total_power(&self) -> f64 {
        self.0[3]
    }

    pub fn loads(&self) -> [f64; 3] {
        [self.0[4], self.0[5], self.0[6]]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Feature vector for external learners
    pub fn to_features(&self) -> Vec<f64> {
        self.0.to_vec()
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.to_features())
    }

    pub fn dimension(&self) -> usize {
        OBSERVATION_DIM
    }
}
