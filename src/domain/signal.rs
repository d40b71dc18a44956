//! Target-allocation signals produced by a strategy for one rebalance date.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalReason {
    MomentumPositive,
    DefensiveRotation,
    BlendAllocation,
    Rebalancing,
    Other,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unrecognised {field}: '{value}'")]
pub struct SignalParseError {
    pub field: &'static str,
    pub value: String,
}

impl FromStr for Direction {
    type Err = SignalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "flat" => Ok(Direction::Flat),
            other => Err(SignalParseError {
                field: "direction",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for SignalReason {
    type Err = SignalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "momentum-positive" => Ok(SignalReason::MomentumPositive),
            "defensive-rotation" => Ok(SignalReason::DefensiveRotation),
            "blend-allocation" => Ok(SignalReason::BlendAllocation),
            "rebalancing" => Ok(SignalReason::Rebalancing),
            "" | "other" => Ok(SignalReason::Other),
            other => Err(SignalParseError {
                field: "reason",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalReason::MomentumPositive => "momentum-positive",
            SignalReason::DefensiveRotation => "defensive-rotation",
            SignalReason::BlendAllocation => "blend-allocation",
            SignalReason::Rebalancing => "rebalancing",
            SignalReason::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub target_weight: f64,
    pub direction: Direction,
    pub reason: SignalReason,
    pub confidence: f64,
}

impl Signal {
    pub fn long(symbol: &str, target_weight: f64) -> Self {
        Signal {
            symbol: symbol.to_string(),
            target_weight,
            direction: Direction::Long,
            reason: SignalReason::Rebalancing,
            confidence: 1.0,
        }
    }

    pub fn flat(symbol: &str) -> Self {
        Signal {
            symbol: symbol.to_string(),
            target_weight: 0.0,
            direction: Direction::Flat,
            reason: SignalReason::Rebalancing,
            confidence: 1.0,
        }
    }

    pub fn with_reason(mut self, reason: SignalReason) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Weight the rebalancer should act on: zero for flat signals.
    pub fn effective_weight(&self) -> f64 {
        match self.direction {
            Direction::Long => self.target_weight,
            Direction::Flat => 0.0,
        }
    }

    /// Non-empty symbol, weight and confidence both within `[0, 1]`.
    pub fn is_well_formed(&self) -> bool {
        !self.symbol.trim().is_empty()
            && (0.0..=1.0).contains(&self.target_weight)
            && (0.0..=1.0).contains(&self.confidence)
    }
}
