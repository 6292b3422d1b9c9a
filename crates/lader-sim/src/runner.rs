//! Episode Runner - drives the control loop
//!
//! One tick is: policy decides on the last observation, the bridge resolves
//! the override and publishes the decision, the environment steps, and the
//! transition lands in the replay buffer. Episodes can be driven tick by
//! tick (paced loops) or run to completion in one call.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lader_core::{Decision, EpisodeId, Result};

use crate::bridge::DecisionBridge;
use crate::env::{FactoryEnergyEnv, StepResult};
use crate::experience::{Experience, ExperienceBuffer};
use crate::export::DecisionRecord;
use crate::policy::Policy;
use crate::state::Observation;

/// Decision log length kept by default, matching the replay buffer
pub const DEFAULT_DECISION_CAPACITY: usize = 10_000;

/// Summary of one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub episode_id: EpisodeId,
    pub policy: String,
    pub seed: u64,
    pub steps: u64,
    pub total_reward: f64,
    pub total_energy_kwh: f64,
    pub mean_power_kw: f64,
    pub peak_power_kw: f64,
    pub min_power_kw: f64,
    pub std_power_kw: f64,
    /// Mean of the per-step mean class load, in percent
    pub mean_load: f64,
    pub truncated: bool,
}

impl EpisodeStats {
    pub fn average_reward(&self) -> f64 {
        if self.steps > 0 {
            self.total_reward / self.steps as f64
        } else {
            0.0
        }
    }
}

/// Relative improvement of one episode over a baseline, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub energy_savings_pct: f64,
    pub power_reduction_pct: f64,
    pub peak_reduction_pct: f64,
    pub stability_improvement_pct: f64,
}

/// Compare an optimized episode against a baseline episode
pub fn compare(baseline: &EpisodeStats, optimized: &EpisodeStats) -> Comparison {
    Comparison {
        energy_savings_pct: reduction_pct(baseline.total_energy_kwh, optimized.total_energy_kwh),
        power_reduction_pct: reduction_pct(baseline.mean_power_kw, optimized.mean_power_kw),
        peak_reduction_pct: reduction_pct(baseline.peak_power_kw, optimized.peak_power_kw),
        stability_improvement_pct: reduction_pct(baseline.std_power_kw, optimized.std_power_kw),
    }
}

fn reduction_pct(baseline: f64, optimized: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (1.0 - optimized / baseline) * 100.0
    }
}

/// Running totals for the episode in progress
#[derive(Debug, Clone)]
struct Progress {
    episode_id: EpisodeId,
    policy: String,
    seed: u64,
    observation: Observation,
    steps: u64,
    total_reward: f64,
    power_sum: f64,
    power_sq_sum: f64,
    peak_power: f64,
    min_power: f64,
    load_sum: f64,
    truncated: bool,
}

impl Progress {
    fn new(policy: &str, seed: u64, observation: Observation) -> Self {
        Self {
            episode_id: EpisodeId::new(),
            policy: policy.to_string(),
            seed,
            observation,
            steps: 0,
            total_reward: 0.0,
            power_sum: 0.0,
            power_sq_sum: 0.0,
            peak_power: 0.0,
            min_power: f64::INFINITY,
            load_sum: 0.0,
            truncated: false,
        }
    }

    fn record(&mut self, result: &StepResult) {
        let power = result.info.state.total_power;
        self.steps += 1;
        self.total_reward += result.reward;
        self.power_sum += power;
        self.power_sq_sum += power * power;
        self.peak_power = self.peak_power.max(power);
        self.min_power = self.min_power.min(power);
        self.load_sum += result.info.state.mean_load();
        self.truncated = result.truncated;
        self.observation = result.observation;
    }

    fn stats(&self, total_energy_kwh: f64) -> EpisodeStats {
        let (mean, std, min) = if self.steps > 0 {
            let n = self.steps as f64;
            let mean = self.power_sum / n;
            let variance = (self.power_sq_sum / n - mean * mean).max(0.0);
            (mean, variance.sqrt(), self.min_power)
        } else {
            (0.0, 0.0, 0.0)
        };

        EpisodeStats {
            episode_id: self.episode_id,
            policy: self.policy.clone(),
            seed: self.seed,
            steps: self.steps,
            total_reward: self.total_reward,
            total_energy_kwh,
            mean_power_kw: mean,
            peak_power_kw: self.peak_power,
            min_power_kw: min,
            std_power_kw: std,
            mean_load: if self.steps > 0 {
                self.load_sum / self.steps as f64
            } else {
                0.0
            },
            truncated: self.truncated,
        }
    }
}

/// Drives the environment with a policy through the decision bridge
pub struct EpisodeRunner {
    env: FactoryEnergyEnv,
    bridge: DecisionBridge,
    buffer: ExperienceBuffer,
    override_decision: Option<Decision>,
    decisions: VecDeque<DecisionRecord>,
    decision_capacity: usize,
    progress: Option<Progress>,
}

impl EpisodeRunner {
    /// Create a runner; the bridge shares the environment's register store
    pub fn new(env: FactoryEnergyEnv) -> Self {
        let bridge = DecisionBridge::new(env.store().clone());
        Self {
            env,
            bridge,
            buffer: ExperienceBuffer::default(),
            override_decision: None,
            decisions: VecDeque::new(),
            decision_capacity: DEFAULT_DECISION_CAPACITY,
            progress: None,
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer = ExperienceBuffer::new(capacity);
        self
    }

    /// Keep at most this many decisions; the oldest are dropped first
    pub fn with_decision_capacity(mut self, capacity: usize) -> Self {
        self.decision_capacity = capacity;
        self.decisions.truncate(capacity);
        self
    }

    /// Manual override: replaces every policy decision until cleared
    pub fn set_override(&mut self, decision: Decision) {
        info!(action = decision.action, "Manual override set");
        self.override_decision = Some(decision);
    }

    pub fn clear_override(&mut self) {
        if self.override_decision.take().is_some() {
            info!("Manual override cleared");
        }
    }

    pub fn override_decision(&self) -> Option<&Decision> {
        self.override_decision.as_ref()
    }

    /// Reset the environment and start a new episode
    pub fn begin(&mut self, policy: &mut dyn Policy, seed: u64) -> Result<Observation> {
        let observation = self.env.reset(seed)?;
        policy.reset();
        self.decisions.clear();

        let progress = Progress::new(policy.name(), seed, observation);
        info!(
            episode = %progress.episode_id,
            policy = policy.name(),
            seed,
            "Episode started"
        );
        self.progress = Some(progress);
        Ok(observation)
    }

    /// Run one control cycle. Starts an episode with the configured seed
    /// when none is in progress.
    pub fn tick(&mut self, policy: &mut dyn Policy) -> Result<StepResult> {
        if self.progress.is_none() {
            let seed = self.env.config().simulation.seed;
            self.begin(policy, seed)?;
        }

        let observation = match &self.progress {
            Some(progress) => {
                if progress.truncated {
                    warn!(
                        episode = %progress.episode_id,
                        steps = progress.steps,
                        "Stepping past the episode horizon"
                    );
                }
                progress.observation
            }
            None => self.env.observation(),
        };

        let decision = policy.decide(&observation)?;
        let (effective, result) =
            self.bridge
                .dispatch(&mut self.env, &decision, self.override_decision.as_ref())?;

        if self.decision_capacity > 0 {
            if self.decisions.len() >= self.decision_capacity {
                self.decisions.pop_front();
            }
            self.decisions
                .push_back(DecisionRecord::new(&effective, observation));
        }
        self.buffer.push(Experience::new(
            observation,
            effective.action,
            result.reward,
            result.observation,
            result.terminated,
            result.truncated,
        ));
        if let Some(progress) = self.progress.as_mut() {
            progress.record(&result);
        }

        debug!(
            action = effective.action,
            reward = result.reward,
            total_power = result.info.state.total_power,
            "Tick complete"
        );
        Ok(result)
    }

    /// Close the current episode and return its summary
    pub fn finish(&mut self) -> Option<EpisodeStats> {
        let progress = self.progress.take()?;
        let stats = progress.stats(self.env.state().cumulative_energy);
        info!(
            episode = %stats.episode_id,
            steps = stats.steps,
            energy_kwh = stats.total_energy_kwh,
            mean_power_kw = stats.mean_power_kw,
            total_reward = stats.total_reward,
            "Episode finished"
        );
        Some(stats)
    }

    /// Run a whole episode: until truncation or `max_steps`, whichever is first
    pub fn run(&mut self, policy: &mut dyn Policy, seed: u64, max_steps: u64) -> Result<EpisodeStats> {
        self.begin(policy, seed)?;

        for _ in 0..max_steps {
            if self.tick(policy)?.truncated {
                break;
            }
        }

        let observation = self.env.observation();
        Ok(self
            .finish()
            .unwrap_or_else(|| Progress::new(policy.name(), seed, observation).stats(0.0)))
    }

    /// Current episode's id, if one is in progress
    pub fn episode_id(&self) -> Option<EpisodeId> {
        self.progress.as_ref().map(|p| p.episode_id)
    }

    pub fn env(&self) -> &FactoryEnergyEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut FactoryEnergyEnv {
        &mut self.env
    }

    pub fn bridge(&self) -> &DecisionBridge {
        &self.bridge
    }

    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ExperienceBuffer {
        &mut self.buffer
    }

    /// Most recent decisions of the current (or last) episode, oldest first
    pub fn decisions(&self) -> &VecDeque<DecisionRecord> {
        &self.decisions
    }

    pub fn take_decisions(&mut self) -> Vec<DecisionRecord> {
        Vec::from(std::mem::take(&mut self.decisions))
    }
}
