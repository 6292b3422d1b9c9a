//! Lader Sim - factory energy simulation and control loop
//!
//! This crate provides the machine power model, the gym-style factory
//! energy environment, the decision bridge between controller and
//! environment, and the episode runner used for evaluation and comparison.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]

pub mod bridge;
pub mod env;
pub mod experience;
pub mod export;
pub mod machine;
pub mod plant;
pub mod policy;
pub mod runner;
pub mod state;

pub use bridge::DecisionBridge;
pub use env::{EnvConfig, Environment, FactoryEnergyEnv, RewardConfig, SimulationConfig, StepInfo, StepResult};
pub use experience::{Batch, Experience, ExperienceBuffer};
pub use machine::{FactorySpec, MachineClass, MachinePowerModel, MachineSpec, ModelParams};
pub use plant::{Plant, RegisterPlant, SimulatedPlant};
pub use policy::{FixedPolicy, Policy, RandomPolicy, ScriptedPolicy};
pub use runner::{compare, Comparison, EpisodeRunner, EpisodeStats, DEFAULT_DECISION_CAPACITY};
pub use state::{ActionTable, Commands, FactoryState, Observation, Reward, OBSERVATION_DIM};
