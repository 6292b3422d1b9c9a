//! Register Store - addressed storage with physical-unit conversion
//!
//! The store is the uniform I/O surface between the factory environment and
//! whatever feeds it: the simulator, a live Modbus device, or a replayed file.
//! Layout (addresses, names, conversions) is fixed once the mapping is loaded;
//! only raw values change afterwards. Each slot holds its raw value in a
//! single atomic, so a monitor reading between ticks never sees a half-written
//! value and needs no lock.
//!
//! Conversion is `physical = raw * scale + offset`, and the exact inverse
//! (rounded to the nearest raw unit) on write.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, trace};

use crate::error::{LaderError, Result};
use crate::mapping::{RegisterDef, RegisterKind};

/// Shared handle to a store; the environment, bridge and monitors hold clones
pub type SharedRegisterStore = Arc<RegisterStore>;

/// Point-in-time view of one register
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Register {
    pub name: String,
    pub address: u16,
    pub kind: RegisterKind,
    pub size: u8,
    pub scale: f64,
    pub offset: f64,
    pub description: String,
    /// Raw integer value (two words combined for double-width registers)
    pub value: u32,
}

impl Register {
    /// Value in physical units
    pub fn physical(&self) -> f64 {
        f64::from(self.value) * self.scale + self.offset
    }
}

struct Slot {
    def: RegisterDef,
    raw: AtomicU32,
}

impl Slot {
    fn max_raw(&self) -> u32 {
        if self.def.size == 2 {
            u32::MAX
        } else {
            u32::from(u16::MAX)
        }
    }

    fn load(&self) -> u32 {
        self.raw.load(Ordering::Acquire)
    }

    fn store(&self, raw: u32) {
        self.raw.store(raw, Ordering::Release);
    }

    fn physical(&self) -> f64 {
        f64::from(self.load()) * self.def.scale + self.def.offset
    }

    fn to_raw(&self, physical: f64) -> Result<u32> {
        let raw = ((physical - self.def.offset) / self.def.scale).round();
        if !raw.is_finite() || raw < 0.0 || raw > f64::from(self.max_raw()) {
            return Err(LaderError::OutOfRange {
                address: self.def.address,
                value: physical,
                raw,
                size: self.def.size,
            });
        }
        Ok(raw as u32)
    }

    fn snapshot(&self) -> Register {
        Register {
            name: self.def.name.clone(),
            address: self.def.address,
            kind: self.def.kind,
            size: self.def.size,
            scale: self.def.scale,
            offset: self.def.offset,
            description: self.def.description.clone(),
            value: self.load(),
        }
    }
}

/// In-memory register table
#[derive(Default)]
pub struct RegisterStore {
    /// Keyed by the register's base address
    slots: BTreeMap<u16, Slot>,
    /// Every word address -> base address of the register covering it
    words: HashMap<u16, u16>,
    names: HashMap<String, u16>,
}

impl RegisterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a mapping, failing fast on any collision
    pub fn from_mapping(defs: &[RegisterDef]) -> Result<Self> {
        let mut store = Self::new();
        store.load_mapping(defs)?;
        Ok(store)
    }

    /// Create a store with the well-known factory register table
    pub fn with_default_mapping() -> Result<Self> {
        Self::from_mapping(&crate::mapping::default_mapping())
    }

    /// Bulk-define registers. Values start at raw 0.
    ///
    /// The whole batch is validated before anything is inserted, so a failed
    /// load leaves the store unchanged.
    pub fn load_mapping(&mut self, defs: &[RegisterDef]) -> Result<()> {
        let mut words: HashMap<u16, &str> = HashMap::new();
        let mut names: HashMap<&str, u16> = HashMap::new();

        for def in defs {
            def.validate()?;

            for word in def.addresses() {
                let existing = self
                    .words
                    .get(&word)
                    .and_then(|base| self.slots.get(base))
                    .map(|slot| slot.def.name.as_str())
                    .or_else(|| words.get(&word).copied());

                if let Some(existing) = existing {
                    return Err(LaderError::DuplicateAddress {
                        address: word,
                        existing: existing.to_string(),
                        incoming: def.name.clone(),
                    });
                }
                words.insert(word, def.name.as_str());
            }

            if self.names.contains_key(&def.name) || names.insert(&def.name, def.address).is_some()
            {
                return Err(LaderError::InvalidMapping {
                    name: def.name.clone(),
                    reason: "duplicate register name".to_string(),
                });
            }
        }

        for def in defs {
            for word in def.addresses() {
                self.words.insert(word, def.address);
            }
            self.names.insert(def.name.clone(), def.address);
            self.slots.insert(
                def.address,
                Slot {
                    def: def.clone(),
                    raw: AtomicU32::new(0),
                },
            );
        }

        info!("Loaded {} registers ({} total)", defs.len(), self.slots.len());
        Ok(())
    }

    fn slot(&self, address: u16) -> Result<&Slot> {
        self.slots
            .get(&address)
            .ok_or(LaderError::UnknownRegister(address))
    }

    /// Read a register in physical units
    pub fn read(&self, address: u16) -> Result<f64> {
        Ok(self.slot(address)?.physical())
    }

    /// Write a register in physical units; visible to readers immediately
    pub fn write(&self, address: u16, physical: f64) -> Result<()> {
        let slot = self.slot(address)?;
        let raw = slot.to_raw(physical)?;
        slot.store(raw);
        trace!(address, physical, raw, "register write");
        Ok(())
    }

    /// Write several registers in physical units.
    ///
    /// Every value is converted first; if any address is unknown or any value
    /// does not fit, nothing is stored.
    pub fn write_many(&self, values: &[(u16, f64)]) -> Result<()> {
        let pending = values
            .iter()
            .map(|&(address, physical)| {
                let slot = self.slot(address)?;
                Ok((slot, slot.to_raw(physical)?))
            })
            .collect::<Result<Vec<_>>>()?;

        for (slot, raw) in pending {
            slot.store(raw);
        }
        trace!(count = values.len(), "register batch write");
        Ok(())
    }

    /// Lowest and highest physical value a register can hold
    pub fn range(&self, address: u16) -> Result<(f64, f64)> {
        let slot = self.slot(address)?;
        let low = slot.def.offset;
        let high = f64::from(slot.max_raw()) * slot.def.scale + slot.def.offset;
        Ok((low.min(high), low.max(high)))
    }

    /// Address of a named register
    pub fn address_of(&self, name: &str) -> Result<u16> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| LaderError::UnknownRegisterName(name.to_string()))
    }

    /// Read a register by name in physical units
    pub fn read_by_name(&self, name: &str) -> Result<f64> {
        self.read(self.address_of(name)?)
    }

    /// Write a register by name in physical units
    pub fn write_by_name(&self, name: &str, physical: f64) -> Result<()> {
        self.write(self.address_of(name)?, physical)
    }

    /// Raw stored integer
    pub fn raw_value(&self, address: u16) -> Result<u32> {
        Ok(self.slot(address)?.load())
    }

    /// Full view of one register
    pub fn get(&self, address: u16) -> Result<Register> {
        Ok(self.slot(address)?.snapshot())
    }

    /// All registers ordered by address
    pub fn registers(&self) -> Vec<Register> {
        self.slots.values().map(Slot::snapshot).collect()
    }

    /// Physical value of every register keyed by name
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.slots
            .values()
            .map(|slot| (slot.def.name.clone(), slot.physical()))
            .collect()
    }

    /// Read `count` consecutive 16-bit words (function codes 03/04).
    ///
    /// Double-width registers are laid out high word first.
    pub fn read_words(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut out = Vec::with_capacity(usize::from(count));
        for i in 0..count {
            let word = address
                .checked_add(i)
                .ok_or(LaderError::UnknownRegister(u16::MAX))?;
            let base = *self
                .words
                .get(&word)
                .ok_or(LaderError::UnknownRegister(word))?;
            let slot = self.slot(base)?;
            let raw = slot.load();

            let value = if slot.def.size == 1 {
                raw as u16
            } else if word == base {
                (raw >> 16) as u16
            } else {
                (raw & 0xFFFF) as u16
            };
            out.push(value);
        }
        Ok(out)
    }

    /// Write consecutive 16-bit words as a device feed would (function codes 06/16).
    ///
    /// Input registers are read-only on this path. A double-width register
    /// must be written as a whole, high word first. The request applies
    /// completely or not at all.
    pub fn write_words(&self, address: u16, values: &[u16]) -> Result<()> {
        let mut pending: Vec<(&Slot, u32)> = Vec::with_capacity(values.len());
        let mut i = 0;
        while i < values.len() {
            let word = u16::try_from(i)
                .ok()
                .and_then(|offset| address.checked_add(offset))
                .ok_or(LaderError::UnknownRegister(u16::MAX))?;
            let base = *self
                .words
                .get(&word)
                .ok_or(LaderError::UnknownRegister(word))?;
            let slot = self.slot(base)?;

            if slot.def.kind == RegisterKind::Input {
                return Err(LaderError::ReadOnlyRegister(base));
            }

            if slot.def.size == 1 {
                pending.push((slot, u32::from(values[i])));
                i += 1;
                continue;
            }

            if word != base || i + 1 >= values.len() {
                return Err(LaderError::OutOfRange {
                    address: base,
                    value: f64::from(values[i]),
                    raw: f64::from(values[i]),
                    size: slot.def.size,
                });
            }
            pending.push((slot, (u32::from(values[i]) << 16) | u32::from(values[i + 1])));
            i += 2;
        }

        for (slot, raw) in pending {
            slot.store(raw);
        }
        trace!(address, count = values.len(), "word write");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, address: u16) -> bool {
        self.slots.contains_key(&address)
    }
}

impl std::fmt::Debug for RegisterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterStore")
            .field("registers", &self.slots.len())
            .finish()
    }
}
