//! Declarative register mapping
//!
//! A mapping is the JSON array consumed by register-map tooling:
//!
//! ```json
//! [
//!   {"name": "total_power", "register": 103, "type": "holding",
//!    "size": 1, "conversion": 0.1, "offset": 0.0, "description": "kW"}
//! ]
//! ```
//!
//! Addresses and kinds must stay stable for interoperability, so the
//! well-known addresses used by the environment are exported as constants.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LaderError, Result};

pub const CONVEYOR_POWER: u16 = 100;
pub const PUSHER_POWER: u16 = 101;
pub const ROBOT_POWER: u16 = 102;
pub const TOTAL_POWER: u16 = 103;
pub const CONVEYOR_LOAD: u16 = 104;
pub const PUSHER_LOAD: u16 = 105;
pub const ROBOT_LOAD: u16 = 106;
pub const SYSTEM_EFFICIENCY: u16 = 107;
/// Double-width: occupies 108 (high word) and 109 (low word)
pub const TOTAL_ENERGY: u16 = 108;
pub const AI_DECISION: u16 = 200;
pub const AI_CONFIDENCE: u16 = 201;

/// Register kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read/write value
    Holding,
    /// Device-owned value, read-only on the word interface
    Input,
}

impl std::fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterKind::Holding => write!(f, "holding"),
            RegisterKind::Input => write!(f, "input"),
        }
    }
}

/// One entry of a register mapping file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDef {
    pub name: String,
    #[serde(rename = "register")]
    pub address: u16,
    #[serde(rename = "type")]
    pub kind: RegisterKind,
    #[serde(default = "default_size")]
    pub size: u8,
    #[serde(rename = "conversion", default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub description: String,
}

fn default_size() -> u8 {
    1
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterDef {
    pub fn new(name: impl Into<String>, address: u16, kind: RegisterKind) -> Self {
        Self {
            name: name.into(),
            address,
            kind,
            size: 1,
            scale: 1.0,
            offset: 0.0,
            description: String::new(),
        }
    }

    pub fn with_size(mut self, size: u8) -> Self {
        self.size = size;
        self
    }

    pub fn with_conversion(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Addresses covered by this register (one per 16-bit word)
    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        let start = u32::from(self.address);
        (start..start + u32::from(self.size)).filter_map(|a| u16::try_from(a).ok())
    }

    /// Check the definition is usable before it reaches the store
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| LaderError::InvalidMapping {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if !matches!(self.size, 1 | 2) {
            return Err(invalid("size must be 1 or 2"));
        }
        if self.size == 2 && self.address == u16::MAX {
            return Err(invalid("double-width register needs two consecutive addresses"));
        }
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(invalid("conversion must be finite and non-zero"));
        }
        if !self.offset.is_finite() {
            return Err(invalid("offset must be finite"));
        }
        Ok(())
    }
}

/// The well-known register table used by the factory environment
pub fn default_mapping() -> Vec<RegisterDef> {
    use RegisterKind::Holding;

    vec![
        RegisterDef::new("conveyor_power", CONVEYOR_POWER, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Conveyor power draw (kW)"),
        RegisterDef::new("pusher_power", PUSHER_POWER, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Pusher power draw (kW)"),
        RegisterDef::new("robot_power", ROBOT_POWER, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Pick-and-place power draw (kW)"),
        RegisterDef::new("total_power", TOTAL_POWER, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Total power draw (kW)"),
        RegisterDef::new("conveyor_load", CONVEYOR_LOAD, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Conveyor load (%)"),
        RegisterDef::new("pusher_load", PUSHER_LOAD, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Pusher load (%)"),
        RegisterDef::new("robot_load", ROBOT_LOAD, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("Pick-and-place load (%)"),
        RegisterDef::new("system_efficiency", SYSTEM_EFFICIENCY, Holding)
            .with_conversion(0.1, 0.0)
            .with_description("System efficiency (%)"),
        RegisterDef::new("total_energy", TOTAL_ENERGY, Holding)
            .with_size(2)
            .with_conversion(0.01, 0.0)
            .with_description("Cumulative energy (kWh)"),
        RegisterDef::new("ai_decision", AI_DECISION, Holding)
            .with_description("Selected sequencing action (0-7)"),
        RegisterDef::new("ai_confidence", AI_CONFIDENCE, Holding)
            .with_conversion(0.001, 0.0)
            .with_description("Decision confidence (0-1)"),
    ]
}

/// Parse a mapping from its JSON text
pub fn parse_mapping(json: &str) -> Result<Vec<RegisterDef>> {
    let defs: Vec<RegisterDef> = serde_json::from_str(json)?;
    for def in &defs {
        def.validate()?;
    }
    Ok(defs)
}

/// Read and parse a mapping file
pub fn load_mapping_file(path: impl AsRef<Path>) -> Result<Vec<RegisterDef>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let defs = parse_mapping(&contents)?;
    debug!("Parsed {} register definitions from {:?}", defs.len(), path);
    Ok(defs)
}
