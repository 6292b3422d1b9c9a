//! Plant seam - where class power and load readings come from
//!
//! The environment does not care whether readings are synthesized or
//! measured. `SimulatedPlant` runs the machine power model with a seeded
//! random source; `RegisterPlant` reads the values a live device feed has
//! written into the register store and, optionally, writes the commanded
//! intensities back out for the device to act on.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use lader_core::mapping;
use lader_core::{Result, SharedRegisterStore};

use crate::machine::{ClassReading, FactorySpec, MachineClass, MachinePowerModel, ModelParams};
use crate::state::Commands;

/// Readings for all three classes, indexed by `MachineClass::index`
pub type PlantReading = [ClassReading; 3];

/// Source of per-class power and load for the environment
pub trait Plant: Send {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Start a new episode and return the initial readings
    fn reset(&mut self, seed: u64) -> Result<PlantReading>;

    /// Apply commands for one tick and return the resulting readings
    fn advance(&mut self, commands: &Commands, dt_seconds: f64) -> Result<PlantReading>;

    /// Whether the environment should publish its state into the register store.
    ///
    /// A plant fed from the store owns those registers; the environment must
    /// not write them too.
    fn publishes_state(&self) -> bool {
        true
    }
}

/// Synthetic plant backed by the machine power model
pub struct SimulatedPlant {
    model: MachinePowerModel,
    rng: ChaCha8Rng,
}

impl SimulatedPlant {
    pub fn new(spec: &FactorySpec, params: ModelParams) -> Result<Self> {
        Ok(Self {
            model: MachinePowerModel::new(spec, params)?,
            rng: ChaCha8Rng::seed_from_u64(0),
        })
    }

    pub fn model(&self) -> &MachinePowerModel {
        &self.model
    }
}

impl Plant for SimulatedPlant {
    fn name(&self) -> &str {
        "simulated"
    }

    fn reset(&mut self, seed: u64) -> Result<PlantReading> {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.model.reset();
        Ok(self.model.idle_readings(&mut self.rng))
    }

    fn advance(&mut self, commands: &Commands, dt_seconds: f64) -> Result<PlantReading> {
        let mut readings = PlantReading::default();
        for class in MachineClass::ALL {
            readings[class.index()] =
                self.model
                    .step(class, commands.get(class), dt_seconds, &mut self.rng);
        }
        Ok(readings)
    }
}

/// Plant driven by live register values
///
/// The device feed writes class power and load into the well-known
/// addresses (100-106); this plant only reads them. Readings are held to
/// each class's rated range, so a noisy feed cannot report more than the
/// floor can draw.
pub struct RegisterPlant {
    store: SharedRegisterStore,
    max_power: [f64; 3],
    command_registers: Option<[u16; 3]>,
}

impl RegisterPlant {
    pub fn new(store: SharedRegisterStore, spec: &FactorySpec) -> Self {
        Self {
            store,
            max_power: MachineClass::ALL.map(|class| spec.get(class).class_max_power()),
            command_registers: None,
        }
    }

    /// Also write each class command (0-1) to the given registers every tick
    pub fn with_command_registers(mut self, registers: [u16; 3]) -> Self {
        self.command_registers = Some(registers);
        self
    }

    fn read_all(&self) -> Result<PlantReading> {
        const POWER: [u16; 3] = [
            mapping::CONVEYOR_POWER,
            mapping::PUSHER_POWER,
            mapping::ROBOT_POWER,
        ];
        const LOAD: [u16; 3] = [
            mapping::CONVEYOR_LOAD,
            mapping::PUSHER_LOAD,
            mapping::ROBOT_LOAD,
        ];

        let mut readings = PlantReading::default();
        for (i, reading) in readings.iter_mut().enumerate() {
            reading.power = self.store.read(POWER[i])?.clamp(0.0, self.max_power[i]);
            reading.load = self.store.read(LOAD[i])?.clamp(0.0, 100.0);
        }
        Ok(readings)
    }
}

impl Plant for RegisterPlant {
    fn name(&self) -> &str {
        "registers"
    }

    fn reset(&mut self, _seed: u64) -> Result<PlantReading> {
        self.read_all()
    }

    fn advance(&mut self, commands: &Commands, _dt_seconds: f64) -> Result<PlantReading> {
        if let Some(registers) = self.command_registers {
            for class in MachineClass::ALL {
                self.store
                    .write(registers[class.index()], commands.get(class))?;
            }
            debug!(?commands, "Commands written to device registers");
        }
        self.read_all()
    }

    fn publishes_state(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lader_core::{RegisterDef, RegisterKind, RegisterStore};

    #[test]
    fn test_simulated_plant_reset_is_deterministic() {
        let spec = FactorySpec::default();
        let mut a = SimulatedPlant::new(&spec, ModelParams::default()).unwrap();
        let mut b = SimulatedPlant::new(&spec, ModelParams::default()).unwrap();

        assert_eq!(a.reset(11).unwrap(), b.reset(11).unwrap());
        let commands = Commands::new(1.0, 0.5, 0.0);
        assert_eq!(
            a.advance(&commands, 1.0).unwrap(),
            b.advance(&commands, 1.0).unwrap()
        );
    }

    #[test]
    fn test_simulated_plant_reset_starts_idle() {
        let spec = FactorySpec::default();
        let mut plant = SimulatedPlant::new(&spec, ModelParams::default()).unwrap();
        let readings = plant.reset(5).unwrap();

        for reading in readings {
            assert_eq!(reading.load, 0.0);
            assert_eq!(reading.surge_units, 0);
        }
        let total: f64 = readings.iter().map(|r| r.power).sum();
        assert!(total > 0.0 && total < 2.0 * spec.idle_baseline());
    }

    #[test]
    fn test_register_plant_reads_live_values() {
        let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
        store.write(mapping::CONVEYOR_POWER, 120.5).unwrap();
        store.write(mapping::PUSHER_LOAD, 40.0).unwrap();

        let mut plant = RegisterPlant::new(Arc::clone(&store), &FactorySpec::default());
        let readings = plant.advance(&Commands::new(1.0, 1.0, 1.0), 1.0).unwrap();

        assert!((readings[0].power - 120.5).abs() < 1e-9);
        assert!((readings[1].load - 40.0).abs() < 1e-9);
        assert_eq!(readings[2].power, 0.0);
        assert!(!plant.publishes_state());
    }

    #[test]
    fn test_register_plant_writes_commands() {
        let mut store = RegisterStore::with_default_mapping().unwrap();
        store
            .load_mapping(&[
                RegisterDef::new("conveyor_cmd", 210, RegisterKind::Holding).with_conversion(0.001, 0.0),
                RegisterDef::new("pusher_cmd", 211, RegisterKind::Holding).with_conversion(0.001, 0.0),
                RegisterDef::new("robot_cmd", 212, RegisterKind::Holding).with_conversion(0.001, 0.0),
            ])
            .unwrap();
        let store = Arc::new(store);

        let mut plant = RegisterPlant::new(Arc::clone(&store), &FactorySpec::default()).with_command_registers([210, 211, 212]);
        plant.advance(&Commands::new(0.8, 0.5, 0.3), 1.0).unwrap();

        assert_eq!(store.raw_value(210).unwrap(), 800);
        assert_eq!(store.raw_value(211).unwrap(), 500);
        assert_eq!(store.raw_value(212).unwrap(), 300);
    }

    #[test]
    fn test_register_plant_missing_register_propagates() {
        let store = Arc::new(RegisterStore::new());
        let mut plant = RegisterPlant::new(store, &FactorySpec::default());
        assert!(plant.reset(0).is_err());
    }

    #[test]
    fn test_register_plant_clamps_to_rated_power() {
        let store = Arc::new(RegisterStore::with_default_mapping().unwrap());
        // Conveyor class is rated 14 x 28 = 392 kW
        store.write(mapping::CONVEYOR_POWER, 450.0).unwrap();
        store.write(mapping::PUSHER_POWER, 20.0).unwrap();

        let mut plant = RegisterPlant::new(Arc::clone(&store), &FactorySpec::default());
        let readings = plant.reset(0).unwrap();

        assert_eq!(readings[0].power, 392.0);
        assert!((readings[1].power - 20.0).abs() < 1e-9);
    }
}
