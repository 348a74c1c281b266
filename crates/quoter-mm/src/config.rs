//! Quoting parameters.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MmError, MmResult};

/// Parameters of the quote decision engine, the cooldown machine and the
/// reconciler. Immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoterParams {
    /// Spread (bps from mid) at zero volatility.
    #[serde(default = "default_min_spread_bps")]
    pub min_spread_bps: Decimal,

    /// Spread (bps from mid) at full volatility.
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: Decimal,

    /// How strongly volatility moves the spread between min and max.
    #[serde(default = "default_volatility_multiplier")]
    pub volatility_multiplier: Decimal,

    /// Quote size at zero volatility.
    #[serde(default = "default_base_size")]
    pub base_size: Decimal,

    /// Lower bound for the volatility-scaled size.
    #[serde(default)]
    pub min_size: Decimal,

    /// Fraction of `base_size` removed at full volatility.
    #[serde(default = "default_size_volatility_sensitivity")]
    pub size_volatility_sensitivity: Decimal,

    /// Absolute position limit.
    #[serde(default = "default_max_position")]
    pub max_position: Decimal,

    /// Spread widening per unit of squared position ratio.
    /// `spread = base * (1 + ratio^2 * scaling)` on the side adding exposure.
    #[serde(default = "default_position_spread_scaling")]
    pub position_spread_scaling: Decimal,

    /// Price change (price units) above which a working order is amended.
    #[serde(default = "default_amend_threshold")]
    pub amend_threshold: Decimal,

    /// Size change above which a working order is amended.
    #[serde(default)]
    pub size_amend_threshold: Decimal,

    /// Hold time after a fill during which the side is not quoted.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Widened-spread window after the cooldown.
    #[serde(default = "default_recovery_ms")]
    pub recovery_ms: u64,

    /// Spread multiplier applied during recovery.
    #[serde(default = "default_recovery_spread_multiplier")]
    pub recovery_spread_multiplier: Decimal,

    /// Top of book older than this is treated as missing.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for QuoterParams {
    fn default() -> Self {
        Self {
            min_spread_bps: default_min_spread_bps(),
            max_spread_bps: default_max_spread_bps(),
            volatility_multiplier: default_volatility_multiplier(),
            base_size: default_base_size(),
            min_size: Decimal::ZERO,
            size_volatility_sensitivity: default_size_volatility_sensitivity(),
            max_position: default_max_position(),
            position_spread_scaling: default_position_spread_scaling(),
            amend_threshold: default_amend_threshold(),
            size_amend_threshold: Decimal::ZERO,
            cooldown_ms: default_cooldown_ms(),
            recovery_ms: default_recovery_ms(),
            recovery_spread_multiplier: default_recovery_spread_multiplier(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl QuoterParams {
    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn recovery_duration(&self) -> Duration {
        Duration::from_millis(self.recovery_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Check parameter consistency. Any error here is fatal at startup.
    pub fn validate(&self) -> MmResult<()> {
        if self.min_spread_bps < Decimal::ZERO {
            return Err(MmError::InvalidConfig(format!(
                "min_spread_bps must be >= 0, got {}",
                self.min_spread_bps
            )));
        }
        if self.min_spread_bps > self.max_spread_bps {
            return Err(MmError::InvalidConfig(format!(
                "min_spread_bps ({}) > max_spread_bps ({})",
                self.min_spread_bps, self.max_spread_bps
            )));
        }
        if self.max_spread_bps * self.recovery_spread_multiplier >= quoter_core::BPS_DIVISOR {
            return Err(MmError::InvalidConfig(
                "max_spread_bps * recovery_spread_multiplier must stay below 10000".to_string(),
            ));
        }
        if self.volatility_multiplier < Decimal::ZERO {
            return Err(MmError::InvalidConfig(
                "volatility_multiplier must be >= 0".to_string(),
            ));
        }
        if self.base_size <= Decimal::ZERO {
            return Err(MmError::InvalidConfig(format!(
                "base_size must be > 0, got {}",
                self.base_size
            )));
        }
        if self.min_size < Decimal::ZERO || self.min_size > self.base_size {
            return Err(MmError::InvalidConfig(format!(
                "min_size must be within [0, base_size], got {}",
                self.min_size
            )));
        }
        if self.size_volatility_sensitivity < Decimal::ZERO
            || self.size_volatility_sensitivity > Decimal::ONE
        {
            return Err(MmError::InvalidConfig(
                "size_volatility_sensitivity must be within [0, 1]".to_string(),
            ));
        }
        if self.max_position <= Decimal::ZERO {
            return Err(MmError::InvalidConfig(format!(
                "max_position must be > 0, got {}",
                self.max_position
            )));
        }
        if self.position_spread_scaling < Decimal::ZERO {
            return Err(MmError::InvalidConfig(
                "position_spread_scaling must be >= 0".to_string(),
            ));
        }
        if self.amend_threshold < Decimal::ZERO || self.size_amend_threshold < Decimal::ZERO {
            return Err(MmError::InvalidConfig(
                "amend thresholds must be >= 0".to_string(),
            ));
        }
        if self.recovery_spread_multiplier < Decimal::ONE {
            return Err(MmError::InvalidConfig(format!(
                "recovery_spread_multiplier must be >= 1, got {}",
                self.recovery_spread_multiplier
            )));
        }
        Ok(())
    }
}

fn default_min_spread_bps() -> Decimal {
    Decimal::new(5, 1) // 0.5 bps
}
fn default_max_spread_bps() -> Decimal {
    Decimal::new(25, 1) // 2.5 bps
}
fn default_volatility_multiplier() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_base_size() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_size_volatility_sensitivity() -> Decimal {
    Decimal::new(5, 1) // half size at full volatility
}
fn default_max_position() -> Decimal {
    Decimal::new(3, 1) // 0.3
}
fn default_position_spread_scaling() -> Decimal {
    Decimal::ONE
}
fn default_amend_threshold() -> Decimal {
    Decimal::new(5, 0) // 5 price units
}
fn default_cooldown_ms() -> u64 {
    5_000
}
fn default_recovery_ms() -> u64 {
    30_000
}
fn default_recovery_spread_multiplier() -> Decimal {
    Decimal::new(3, 0)
}
fn default_stale_after_ms() -> u64 {
    5_000
}
