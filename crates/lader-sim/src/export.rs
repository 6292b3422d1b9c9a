//! Serializable records handed to dashboards and plant-side integrations

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use lader_core::{Decision, Result};

use crate::state::{FactoryState, Observation};

/// Handshake protocol version
pub const HANDSHAKE_VERSION: &str = "1.0";

/// Handshake transport identifier
pub const HANDSHAKE_PROTOCOL: &str = "TCP_JSON";

/// One decision with the observation it was made on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub action: u8,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub observed_state: Observation,
}

impl DecisionRecord {
    pub fn new(decision: &Decision, observed_state: Observation) -> Self {
        Self {
            action: decision.action,
            confidence: decision.confidence,
            timestamp: decision.timestamp,
            observed_state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDecision {
    pub action: u8,
    pub confidence: f64,
    pub power_savings_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDecisionPayload {
    pub timestamp: DateTime<Utc>,
    pub ai_decision: AiDecision,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AiDecisionPayload {
    pub fn new(decision: &Decision, power_savings_kw: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            ai_decision: AiDecision {
                action: decision.action,
                confidence: decision.confidence,
                power_savings_kw,
            },
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Per-class and total power in kW
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerBreakdown {
    pub conveyor: f64,
    pub pusher: f64,
    pub robot: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub power: PowerBreakdown,
    pub efficiency: f64,
    /// Mean class load in percent
    pub throughput: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatusPayload {
    pub timestamp: DateTime<Utc>,
    pub system_status: SystemStatus,
}

impl SystemStatusPayload {
    pub fn from_state(state: &FactoryState) -> Self {
        Self {
            timestamp: Utc::now(),
            system_status: SystemStatus {
                power: PowerBreakdown {
                    conveyor: state.conveyor_power,
                    pusher: state.pusher_power,
                    robot: state.robot_power,
                    total: state.total_power,
                },
                efficiency: state.system_efficiency,
                throughput: state.mean_load(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub handshake: Handshake,
}

impl HandshakePayload {
    pub fn new(status: impl Into<String>) -> Self {
        Self::at(status, Utc::now())
    }

    pub fn at(status: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            handshake: Handshake {
                status: status.into(),
                timestamp,
                version: HANDSHAKE_VERSION.to_string(),
                protocol: HANDSHAKE_PROTOCOL.to_string(),
            },
        }
    }
}

/// Pretty-printed JSON
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_record_fields() {
        let decision = Decision::new(6, 0.75).unwrap();
        let record = DecisionRecord::new(&decision, Observation([1.0; 10]));

        let value: Value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["action"], 6);
        assert_eq!(value["confidence"], 0.75);
        assert!(value["timestamp"].is_string());
        assert_eq!(value["observed_state"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_ai_decision_payload_shape() {
        let decision = Decision::new(4, 0.9).unwrap();
        let payload = AiDecisionPayload::new(&decision, 12.5).with_metadata("episode", "abc");

        let value: Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["ai_decision"]["action"], 4);
        assert_eq!(value["ai_decision"]["power_savings_kw"], 12.5);
        assert_eq!(value["metadata"]["episode"], "abc");
    }

    #[test]
    fn test_system_status_payload() {
        let state = FactoryState {
            conveyor_power: 100.0,
            pusher_power: 20.0,
            robot_power: 10.0,
            total_power: 130.0,
            conveyor_load: 90.0,
            pusher_load: 60.0,
            robot_load: 30.0,
            system_efficiency: 85.0,
            ..Default::default()
        };
        let payload = SystemStatusPayload::from_state(&state);

        assert_eq!(payload.system_status.power.total, 130.0);
        assert_eq!(payload.system_status.throughput, 60.0);
        assert_eq!(payload.system_status.efficiency, 85.0);
    }

    #[test]
    fn test_handshake_payload() {
        let payload = HandshakePayload::new("ready");
        let json = to_json(&payload).unwrap();
        assert!(json.contains("\"TCP_JSON\""));

        let parsed: HandshakePayload = from_json(&json).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.handshake.version, "1.0");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result: Result<HandshakePayload> = from_json("{");
        assert!(result.is_err());
    }
}
