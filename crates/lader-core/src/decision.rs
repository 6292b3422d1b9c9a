//! Decision type shared by the policy side and the register bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LaderError, Result};

/// Number of discrete sequencing actions
pub const ACTION_COUNT: usize = 8;

/// A controller decision for one control step
///
/// Decisions are immutable once built; the next step produces a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DecisionFields")]
pub struct Decision {
    /// Sequencing action index (0-7)
    pub action: u8,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Build a decision stamped with the current time.
    ///
    /// The action must be inside the discrete action space; confidence is
    /// clamped into [0, 1] (NaN becomes 0).
    pub fn new(action: i64, confidence: f64) -> Result<Self> {
        Self::at(action, confidence, Utc::now())
    }

    /// Build a decision with an explicit timestamp
    pub fn at(action: i64, confidence: f64, timestamp: DateTime<Utc>) -> Result<Self> {
        let action = validate_action(action)?;
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Ok(Self {
            action,
            confidence,
            timestamp,
        })
    }

    /// Action as an index into the action table
    pub fn action_index(&self) -> usize {
        usize::from(self.action)
    }
}

/// Wire form of a decision, checked on the way in
#[derive(Deserialize)]
struct DecisionFields {
    action: i64,
    confidence: f64,
    timestamp: DateTime<Utc>,
}

impl TryFrom<DecisionFields> for Decision {
    type Error = LaderError;

    fn try_from(fields: DecisionFields) -> Result<Self> {
        Self::at(fields.action, fields.confidence, fields.timestamp)
    }
}

/// Check an action index against the discrete action space
pub fn validate_action(action: i64) -> Result<u8> {
    if (0..ACTION_COUNT as i64).contains(&action) {
        Ok(action as u8)
    } else {
        Err(LaderError::InvalidAction(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_valid_range() {
        for action in 0..8 {
            let decision = Decision::new(action, 0.5).unwrap();
            assert_eq!(i64::from(decision.action), action);
        }
    }

    #[test]
    fn test_decision_invalid_action() {
        assert!(matches!(
            Decision::new(8, 0.5),
            Err(LaderError::InvalidAction(8))
        ));
        assert!(matches!(
            Decision::new(-1, 0.5),
            Err(LaderError::InvalidAction(-1))
        ));
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Decision::new(1, 1.7).unwrap().confidence, 1.0);
        assert_eq!(Decision::new(1, -0.2).unwrap().confidence, 0.0);
        assert_eq!(Decision::new(1, f64::NAN).unwrap().confidence, 0.0);
    }

    #[test]
    fn test_decision_serialization() {
        let decision = Decision::new(3, 0.875).unwrap();
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, decision);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range_action() {
        let json = r#"{"action": 200, "confidence": 0.5, "timestamp": "2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<Decision>(json).is_err());

        let json = r#"{"action": 4, "confidence": 3.0, "timestamp": "2024-01-01T00:00:00Z"}"#;
        let parsed: Decision = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.action, 4);
        assert_eq!(parsed.confidence, 1.0);
    }
}
