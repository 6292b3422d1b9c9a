//! Compare a policy against the full-parallel baseline

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use lader_sim::{compare, Comparison, EpisodeRunner, EpisodeStats, FactoryEnergyEnv, FixedPolicy};

use super::run::PolicyArgs;
use crate::config::Config;

/// Every machine at full rate from the first tick
const BASELINE_ACTION: i64 = 7;

#[derive(Debug, Clone, Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Seed shared by both episodes (defaults to simulation.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Steps per episode (defaults to the episode horizon)
    #[arg(long)]
    pub steps: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    baseline: EpisodeStats,
    optimized: EpisodeStats,
    comparison: Comparison,
}

pub async fn run(args: CompareArgs, config: &Config) -> Result<()> {
    let seed = args.seed.unwrap_or(config.simulation.seed);
    let steps = args.steps.unwrap_or(config.simulation.episode_horizon);

    let baseline = run_episode(config, &mut FixedPolicy::new(BASELINE_ACTION)?, seed, steps)?;
    let mut policy = args.policy.build(seed)?;
    let optimized = run_episode(config, policy.as_mut(), seed, steps)?;
    let comparison = compare(&baseline, &optimized);

    let report = Report {
        baseline,
        optimized,
        comparison,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Each episode gets its own store so the two runs never share registers
fn run_episode(config: &Config, policy: &mut dyn lader_sim::Policy, seed: u64, steps: u64) -> Result<EpisodeStats> {
    let store = Arc::new(config.register_store()?);
    let env = FactoryEnergyEnv::new(config.env_config(), store)?;
    Ok(EpisodeRunner::new(env).run(policy, seed, steps)?)
}

fn print_report(report: &Report) {
    let (b, o, c) = (&report.baseline, &report.optimized, &report.comparison);

    println!("Policy Comparison (seed {}, {} steps)", b.seed, b.steps);
    println!("==========================================");
    println!("{:<18} {:>12} {:>12}", "", b.policy, o.policy);
    println!("{:<18} {:>12.3} {:>12.3}", "Energy (kWh)", b.total_energy_kwh, o.total_energy_kwh);
    println!("{:<18} {:>12.2} {:>12.2}", "Mean power (kW)", b.mean_power_kw, o.mean_power_kw);
    println!("{:<18} {:>12.2} {:>12.2}", "Peak power (kW)", b.peak_power_kw, o.peak_power_kw);
    println!("{:<18} {:>12.2} {:>12.2}", "Power std (kW)", b.std_power_kw, o.std_power_kw);
    println!("{:<18} {:>12.1} {:>12.1}", "Mean load (%)", b.mean_load, o.mean_load);
    println!();
    println!("Energy savings:        {:>7.2} %", c.energy_savings_pct);
    println!("Power reduction:       {:>7.2} %", c.power_reduction_pct);
    println!("Peak reduction:        {:>7.2} %", c.peak_reduction_pct);
    println!("Stability improvement: {:>7.2} %", c.stability_improvement_pct);
}
