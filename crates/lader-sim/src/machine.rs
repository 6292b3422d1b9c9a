//! Machine Power Model
//!
//! Per-class stochastic power and load simulation. Every unit tracks its last
//! commanded intensity and its settled (noise-free) power; each tick the
//! settled power moves toward the commanded target with a first-order lag,
//! then the unit's reading gets bounded Gaussian measurement jitter and, on a
//! cold start, an inrush surge for that tick only. Unit readings are clamped
//! to `[0, max_power]`, so no command can push a class past its rating.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use lader_core::{LaderError, Result};

/// A command at or below this is treated as "off" for surge detection
pub const COLD_COMMAND: f64 = 0.05;

/// A command above this from a cold unit triggers the startup surge
pub const SURGE_COMMAND: f64 = 0.5;

/// Jitter is truncated at this many standard deviations
pub const NOISE_BOUND_SIGMAS: f64 = 3.0;

/// Machine classes on the factory floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineClass {
    Conveyor,
    Pusher,
    PickPlace,
}

impl MachineClass {
    pub const ALL: [MachineClass; 3] = [
        MachineClass::Conveyor,
        MachineClass::Pusher,
        MachineClass::PickPlace,
    ];

    /// Position in per-class arrays
    pub fn index(self) -> usize {
        match self {
            MachineClass::Conveyor => 0,
            MachineClass::Pusher => 1,
            MachineClass::PickPlace => 2,
        }
    }
}

impl std::fmt::Display for MachineClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineClass::Conveyor => write!(f, "conveyor"),
            MachineClass::Pusher => write!(f, "pusher"),
            MachineClass::PickPlace => write!(f, "pick_place"),
        }
    }
}

/// Static description of one machine class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    /// Number of units
    pub count: usize,
    /// Rated power per unit (kW)
    pub max_power: f64,
    /// Draw of an idle, powered unit (kW)
    pub idle_power: f64,
    /// Inrush multiplier applied on the startup tick
    pub startup_surge: f64,
    /// Share of active power turned into useful work (0-1]
    pub efficiency: f64,
    /// Rated throughput per unit (items per tick)
    pub rated_throughput: f64,
}

impl MachineSpec {
    pub fn conveyor() -> Self {
        Self {
            count: 14,
            max_power: 28.0,
            idle_power: 0.5,
            startup_surge: 2.0,
            efficiency: 0.92,
            rated_throughput: 1.0,
        }
    }

    pub fn pusher() -> Self {
        Self {
            count: 4,
            max_power: 12.0,
            idle_power: 0.5,
            startup_surge: 3.0,
            efficiency: 0.88,
            rated_throughput: 1.0,
        }
    }

    pub fn pick_place() -> Self {
        Self {
            count: 3,
            max_power: 12.0,
            idle_power: 0.2,
            startup_surge: 4.0,
            efficiency: 0.90,
            rated_throughput: 1.0,
        }
    }

    /// Rated power of the whole class
    pub fn class_max_power(&self) -> f64 {
        self.count as f64 * self.max_power
    }

    /// Idle draw of the whole class
    pub fn class_idle_power(&self) -> f64 {
        self.count as f64 * self.idle_power
    }

    pub fn validate(&self, class: MachineClass) -> Result<()> {
        let fail = |reason: &str| Err(LaderError::Config(format!("{class}: {reason}")));

        if self.count == 0 {
            return fail("count must be at least 1");
        }
        if !(self.max_power.is_finite() && self.max_power > 0.0) {
            return fail("max_power must be positive");
        }
        if !(self.idle_power >= 0.0 && self.idle_power < self.max_power) {
            return fail("idle_power must be in [0, max_power)");
        }
        if !(self.startup_surge.is_finite() && self.startup_surge >= 1.0) {
            return fail("startup_surge must be >= 1");
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return fail("efficiency must be in (0, 1]");
        }
        if !(self.rated_throughput.is_finite() && self.rated_throughput > 0.0) {
            return fail("rated_throughput must be positive");
        }
        Ok(())
    }
}

/// Machine specs for the whole factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorySpec {
    pub conveyor: MachineSpec,
    pub pusher: MachineSpec,
    pub pick_place: MachineSpec,
}

impl Default for FactorySpec {
    fn default() -> Self {
        Self {
            conveyor: MachineSpec::conveyor(),
            pusher: MachineSpec::pusher(),
            pick_place: MachineSpec::pick_place(),
        }
    }
}

impl FactorySpec {
    pub fn get(&self, class: MachineClass) -> &MachineSpec {
        match class {
            MachineClass::Conveyor => &self.conveyor,
            MachineClass::Pusher => &self.pusher,
            MachineClass::PickPlace => &self.pick_place,
        }
    }

    /// Sum of every unit's rated power (476 kW for the standard floor)
    pub fn total_max_power(&self) -> f64 {
        MachineClass::ALL
            .iter()
            .map(|c| self.get(*c).class_max_power())
            .sum()
    }

    /// Sum of every unit's idle draw
    pub fn idle_baseline(&self) -> f64 {
        MachineClass::ALL
            .iter()
            .map(|c| self.get(*c).class_idle_power())
            .sum()
    }

    pub fn validate(&self) -> Result<()> {
        for class in MachineClass::ALL {
            self.get(class).validate(class)?;
        }
        Ok(())
    }
}

/// Tuning shared by every class model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    /// Jitter standard deviation as a fraction of max_power
    pub noise_fraction: f64,
    /// First-order response time constant in seconds (0 = instant)
    pub response_time_s: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            noise_fraction: 0.01,
            response_time_s: 1.0,
        }
    }
}

/// Result of advancing one class by one tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassReading {
    /// Class power draw (kW)
    pub power: f64,
    /// Achieved throughput as % of rated (0-100)
    pub load: f64,
    /// Units that hit a startup surge this tick
    pub surge_units: usize,
}

#[derive(Debug, Clone, Copy)]
struct UnitState {
    command: f64,
    settled_power: f64,
}

/// Power model for one machine class
#[derive(Debug, Clone)]
pub struct ClassModel {
    class: MachineClass,
    spec: MachineSpec,
    params: ModelParams,
    units: Vec<UnitState>,
}

impl ClassModel {
    pub fn new(class: MachineClass, spec: MachineSpec, params: ModelParams) -> Self {
        let idle = UnitState {
            command: 0.0,
            settled_power: spec.idle_power,
        };
        Self {
            class,
            units: vec![idle; spec.count],
            spec,
            params,
        }
    }

    pub fn class(&self) -> MachineClass {
        self.class
    }

    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    /// Return every unit to idle with no command
    pub fn reset(&mut self) {
        for unit in &mut self.units {
            unit.command = 0.0;
            unit.settled_power = self.spec.idle_power;
        }
    }

    /// Sum of the units' settled power from the previous tick
    pub fn previous_power(&self) -> f64 {
        self.units.iter().map(|u| u.settled_power).sum()
    }

    /// Advance every unit one tick at the given intensity.
    ///
    /// Out-of-range commands are clamped into [0, 1].
    pub fn step<R: Rng + ?Sized>(&mut self, command: f64, dt_seconds: f64, rng: &mut R) -> ClassReading {
        let command = clamp_command(command);
        let spec = &self.spec;
        let target = spec.idle_power + command * (spec.max_power - spec.idle_power);
        let alpha = response_factor(dt_seconds, self.params.response_time_s);
        let sigma = self.params.noise_fraction * spec.max_power;

        let mut power = 0.0;
        let mut throughput = 0.0;
        let mut surge_units = 0;

        for unit in &mut self.units {
            let settled = unit.settled_power + (target - unit.settled_power) * alpha;
            let surging = unit.command <= COLD_COMMAND && command > SURGE_COMMAND;

            let mut reading = settled;
            if surging {
                reading *= spec.startup_surge;
                surge_units += 1;
            }
            reading += bounded_gaussian(rng) * sigma;
            power += reading.clamp(0.0, spec.max_power);

            // A unit spinning up delivers half its throughput on the surge tick
            let delivered = spec.rated_throughput * command * spec.efficiency;
            throughput += if surging { delivered * 0.5 } else { delivered };

            unit.command = command;
            unit.settled_power = settled;
        }

        let rated = spec.rated_throughput * spec.count as f64;
        let load = (throughput / rated * 100.0).clamp(0.0, 100.0);

        trace!(class = %self.class, command, power, load, surge_units, "class step");

        ClassReading {
            power,
            load,
            surge_units,
        }
    }

    /// Idle reading with jitter, used when an episode starts
    pub fn idle_reading<R: Rng + ?Sized>(&self, rng: &mut R) -> ClassReading {
        let sigma = self.params.noise_fraction * self.spec.max_power;
        let power = self
            .units
            .iter()
            .map(|u| (u.settled_power + bounded_gaussian(rng) * sigma).clamp(0.0, self.spec.max_power))
            .sum();
        ClassReading {
            power,
            load: 0.0,
            surge_units: 0,
        }
    }
}

/// Power model for the whole floor: one `ClassModel` per machine class
#[derive(Debug, Clone)]
pub struct MachinePowerModel {
    classes: [ClassModel; 3],
}

impl MachinePowerModel {
    pub fn new(spec: &FactorySpec, params: ModelParams) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            classes: MachineClass::ALL
                .map(|class| ClassModel::new(class, spec.get(class).clone(), params)),
        })
    }

    pub fn reset(&mut self) {
        for model in &mut self.classes {
            model.reset();
        }
    }

    /// Advance one class by one tick
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        class: MachineClass,
        command: f64,
        dt_seconds: f64,
        rng: &mut R,
    ) -> ClassReading {
        self.classes[class.index()].step(command, dt_seconds, rng)
    }

    pub fn class_model(&self, class: MachineClass) -> &ClassModel {
        &self.classes[class.index()]
    }

    /// Idle readings for every class
    pub fn idle_readings<R: Rng + ?Sized>(&self, rng: &mut R) -> [ClassReading; 3] {
        [
            self.classes[0].idle_reading(rng),
            self.classes[1].idle_reading(rng),
            self.classes[2].idle_reading(rng),
        ]
    }
}

/// Clamp a commanded intensity into [0, 1]; NaN means off
pub fn clamp_command(command: f64) -> f64 {
    if command.is_nan() {
        0.0
    } else {
        command.clamp(0.0, 1.0)
    }
}

fn response_factor(dt_seconds: f64, tau: f64) -> f64 {
    if tau <= 0.0 || dt_seconds <= 0.0 {
        1.0
    } else {
        1.0 - (-dt_seconds / tau).exp()
    }
}

/// Standard normal sample (Box-Muller) truncated at +/- NOISE_BOUND_SIGMAS
fn bounded_gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z.clamp(-NOISE_BOUND_SIGMAS, NOISE_BOUND_SIGMAS)
}
