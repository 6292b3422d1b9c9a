//! Episode execution: run a policy against the environment

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use lader_core::{Decision, SharedRegisterStore};
use lader_sim::export::{self, AiDecisionPayload, HandshakePayload, SystemStatusPayload};
use lader_sim::{
    EpisodeRunner, EpisodeStats, FactoryEnergyEnv, FixedPolicy, Policy, RandomPolicy,
    ScriptedPolicy,
};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Same action every tick (--action)
    Fixed,
    /// Cycle through --script
    Scripted,
    /// Class-by-class ramp, then hold
    Staggered,
    /// Uniform random actions seeded from --seed
    Random,
}

#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    /// Controller to drive the episode with
    #[arg(long, value_enum, default_value_t = PolicyKind::Staggered)]
    pub policy: PolicyKind,

    /// Action for the fixed policy (0-7)
    #[arg(long, default_value_t = 7)]
    pub action: i64,

    /// Comma-separated actions for the scripted policy
    #[arg(long, value_delimiter = ',')]
    pub script: Vec<i64>,
}

impl PolicyArgs {
    pub fn build(&self, seed: u64) -> Result<Box<dyn Policy>> {
        let policy: Box<dyn Policy> = match self.policy {
            PolicyKind::Fixed => Box::new(FixedPolicy::new(self.action)?),
            PolicyKind::Scripted => Box::new(ScriptedPolicy::new(&self.script)?),
            PolicyKind::Staggered => Box::new(ScriptedPolicy::staggered()),
            PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
        };
        Ok(policy)
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Episode seed (defaults to simulation.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Step limit (defaults to the episode horizon)
    #[arg(long)]
    pub steps: Option<u64>,

    /// Pace ticks this many milliseconds apart and monitor the registers
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Force this action every tick regardless of the policy
    #[arg(long = "override")]
    pub override_action: Option<i64>,

    /// Write decision and status records into this directory
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: RunArgs, config: &Config) -> Result<()> {
    let store: SharedRegisterStore = Arc::new(config.register_store()?);
    let env = FactoryEnergyEnv::new(config.env_config(), Arc::clone(&store))
        .context("Failed to build environment")?;
    let mut runner = EpisodeRunner::new(env);

    let seed = args.seed.unwrap_or(config.simulation.seed);
    let steps = args.steps.unwrap_or(config.simulation.episode_horizon);
    let mut policy = args.policy.build(seed)?;

    if let Some(action) = args.override_action {
        runner.set_override(Decision::new(action, 1.0)?);
    }

    let stats = match args.tick_ms {
        Some(tick_ms) => {
            let poll = Duration::from_millis(config.modbus.polling_interval_ms.max(1));
            run_paced(
                &mut runner,
                policy.as_mut(),
                seed,
                steps,
                Duration::from_millis(tick_ms.max(1)),
                poll,
            )
            .await?
        }
        None => runner.run(policy.as_mut(), seed, steps)?,
    };

    if let Some(dir) = &args.export {
        export_records(dir, &mut runner, &stats, config)?;
    }

    print_stats(&stats, args.json)
}

/// Drive the runner on a fixed tick while a monitor task reads register
/// snapshots. Ctrl-C abandons the episode at the next tick boundary.
pub async fn run_paced(
    runner: &mut EpisodeRunner,
    policy: &mut dyn Policy,
    seed: u64,
    steps: u64,
    tick: Duration,
    poll: Duration,
) -> Result<EpisodeStats> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = tokio::spawn(monitor_registers(Arc::clone(runner.env().store()), poll, stop_rx));

    runner.begin(policy, seed)?;
    let mut interval = tokio::time::interval(tick);
    let mut completed = 0;

    while completed < steps {
        tokio::select! {
            _ = interval.tick() => {
                let result = runner.tick(policy)?;
                completed += 1;
                if result.truncated {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(completed, "Interrupted, abandoning episode");
                break;
            }
        }
    }

    let _ = stop_tx.send(true);
    let samples = monitor.await.context("Register monitor failed")?;
    debug!(samples, "Register monitor stopped");

    runner
        .finish()
        .context("Episode was not started")
}

/// Periodically read the register table until told to stop.
/// Returns the number of snapshots taken.
async fn monitor_registers(
    store: SharedRegisterStore,
    poll: Duration,
    mut stop: watch::Receiver<bool>,
) -> u64 {
    let mut interval = tokio::time::interval(poll);
    let mut samples = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = store.snapshot();
                samples += 1;
                debug!(
                    total_power = snapshot.get("total_power").copied().unwrap_or_default(),
                    total_energy = snapshot.get("total_energy").copied().unwrap_or_default(),
                    ai_decision = snapshot.get("ai_decision").copied().unwrap_or_default(),
                    "Register snapshot"
                );
            }
            // Stop signal or sender dropped
            _ = stop.changed() => break,
        }
    }
    samples
}

fn export_records(dir: &Path, runner: &mut EpisodeRunner, stats: &EpisodeStats, config: &Config) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let write = |name: &str, json: String| -> Result<()> {
        let path = dir.join(name);
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    };

    let decisions = runner.take_decisions();
    write("decisions.json", export::to_json(&decisions)?)?;

    if let Some(last) = decisions.last() {
        let decision = Decision::at(i64::from(last.action), last.confidence, last.timestamp)?;
        let savings = config.machines.total_max_power() - stats.mean_power_kw;
        let payload = AiDecisionPayload::new(&decision, savings)
            .with_metadata("episode_id", stats.episode_id.to_string())
            .with_metadata("policy", stats.policy.clone())
            .with_metadata("steps", stats.steps);
        write("ai_decision.json", export::to_json(&payload)?)?;
    }

    let status = SystemStatusPayload::from_state(runner.env().state());
    write("status.json", export::to_json(&status)?)?;
    write("handshake.json", export::to_json(&HandshakePayload::new("ready"))?)?;

    info!(dir = %dir.display(), decisions = decisions.len(), "Records exported");
    Ok(())
}

fn print_stats(stats: &EpisodeStats, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    println!("Episode {}", stats.episode_id);
    println!("==========");
    println!("Policy:          {}", stats.policy);
    println!("Seed:            {}", stats.seed);
    println!(
        "Steps:           {}{}",
        stats.steps,
        if stats.truncated { " (horizon reached)" } else { "" }
    );
    println!("Total reward:    {:.3}", stats.total_reward);
    println!("Energy:          {:.3} kWh", stats.total_energy_kwh);
    println!("Mean power:      {:.2} kW", stats.mean_power_kw);
    println!("Peak power:      {:.2} kW", stats.peak_power_kw);
    println!("Min power:       {:.2} kW", stats.min_power_kw);
    println!("Power std dev:   {:.2} kW", stats.std_power_kw);
    println!("Mean load:       {:.1} %", stats.mean_load);
    Ok(())
}
