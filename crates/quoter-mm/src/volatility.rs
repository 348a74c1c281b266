//! Volatility sources.
//!
//! The quoting engine only consumes a scalar >= 0 (clamped to [0, 1] where
//! it widens the spread). Where the number comes from is pluggable:
//! - [`FixedVolatility`]: a configured constant.
//! - [`SharedVolatility`]: published by an external estimator over a watch channel.
//! - [`RollingVolatility`]: standard deviation of mid log-returns over a
//!   rolling window, expressed in bps and divided by a reference level.

use std::collections::VecDeque;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio::sync::watch;

use quoter_core::Price;

/// Source of the volatility scalar sampled into the snapshot.
pub trait VolatilitySource: Send + Sync {
    /// Latest value, never negative.
    fn current(&self) -> Decimal;

    /// Feed a fresh mid price. Sources that do not estimate ignore it.
    fn observe_mid(&mut self, _mid: Price) {}

    fn name(&self) -> &'static str;
}

/// Constant volatility.
#[derive(Debug, Clone)]
pub struct FixedVolatility(Decimal);

impl FixedVolatility {
    pub fn new(value: Decimal) -> Self {
        Self(value.max(Decimal::ZERO))
    }
}

impl VolatilitySource for FixedVolatility {
    fn current(&self) -> Decimal {
        self.0
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Volatility published by another task.
#[derive(Debug, Clone)]
pub struct SharedVolatility {
    rx: watch::Receiver<Decimal>,
}

impl SharedVolatility {
    /// Create the publishing half and the source.
    pub fn channel(initial: Decimal) -> (watch::Sender<Decimal>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }
}

impl VolatilitySource for SharedVolatility {
    fn current(&self) -> Decimal {
        (*self.rx.borrow()).max(Decimal::ZERO)
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}

/// Realized volatility of the mid price.
#[derive(Debug)]
pub struct RollingVolatility {
    last_mid: Option<f64>,
    /// Log-returns in bps.
    returns: VecDeque<f64>,
    max_samples: usize,
    min_samples: usize,
    /// Std-dev (bps) that maps to a scalar of 1.0.
    reference_bps: f64,
}

impl RollingVolatility {
    pub fn new(max_samples: usize, min_samples: usize, reference_bps: f64) -> Self {
        Self {
            last_mid: None,
            returns: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(2),
            min_samples: min_samples.max(2),
            reference_bps,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.returns.len()
    }

    fn std_dev_bps(&self) -> Option<f64> {
        let n = self.returns.len();
        if n < self.min_samples {
            return None;
        }
        let mean = self.returns.iter().sum::<f64>() / n as f64;
        let var = self.returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    }
}

impl VolatilitySource for RollingVolatility {
    fn current(&self) -> Decimal {
        if self.reference_bps <= 0.0 {
            return Decimal::ZERO;
        }
        self.std_dev_bps()
            .map(|sd| sd / self.reference_bps)
            .filter(|v| v.is_finite())
            .and_then(Decimal::from_f64)
            .map(|v| v.round_dp(6).max(Decimal::ZERO))
            .unwrap_or(Decimal::ZERO)
    }

    fn observe_mid(&mut self, mid: Price) {
        let Some(mid) = mid.inner().to_f64().filter(|m| *m > 0.0) else {
            return;
        };
        if let Some(prev) = self.last_mid {
            let ret_bps = (mid / prev).ln() * 10_000.0;
            self.returns.push_back(ret_bps);
            while self.returns.len() > self.max_samples {
                self.returns.pop_front();
            }
        }
        self.last_mid = Some(mid);
    }

    fn name(&self) -> &'static str {
        "rolling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fixed_never_negative() {
        assert_eq!(FixedVolatility::new(dec!(0.4)).current(), dec!(0.4));
        assert_eq!(FixedVolatility::new(dec!(-1)).current(), dec!(0));
    }

    #[test]
    fn test_shared_follows_publisher() {
        let (tx, source) = SharedVolatility::channel(dec!(0.2));
        assert_eq!(source.current(), dec!(0.2));
        tx.send(dec!(0.9)).unwrap();
        assert_eq!(source.current(), dec!(0.9));
        tx.send(dec!(-0.1)).unwrap();
        assert_eq!(source.current(), dec!(0));
    }

    #[test]
    fn test_rolling_needs_min_samples() {
        let mut source = RollingVolatility::new(100, 5, 10.0);
        for _ in 0..4 {
            source.observe_mid(Price::new(dec!(100)));
        }
        assert_eq!(source.sample_count(), 3);
        assert_eq!(source.current(), dec!(0));
    }

    #[test]
    fn test_rolling_flat_market_is_zero() {
        let mut source = RollingVolatility::new(100, 5, 10.0);
        for _ in 0..20 {
            source.observe_mid(Price::new(dec!(100)));
        }
        assert_eq!(source.current(), dec!(0));
    }

    #[test]
    fn test_rolling_choppy_market_is_positive() {
        let mut calm = RollingVolatility::new(100, 5, 10.0);
        let mut choppy = RollingVolatility::new(100, 5, 10.0);
        for i in 0..40 {
            let (c, w) = if i % 2 == 0 {
                (dec!(100), dec!(100))
            } else {
                (dec!(100.01), dec!(100.5))
            };
            calm.observe_mid(Price::new(c));
            choppy.observe_mid(Price::new(w));
        }
        assert!(calm.current() > dec!(0));
        assert!(choppy.current() > calm.current());
    }

    #[test]
    fn test_rolling_window_is_bounded() {
        let mut source = RollingVolatility::new(10, 2, 10.0);
        for i in 0..50 {
            source.observe_mid(Price::new(dec!(100) + Decimal::from(i % 3)));
        }
        assert_eq!(source.sample_count(), 10);
    }

    #[test]
    fn test_rolling_ignores_non_positive_mid() {
        let mut source = RollingVolatility::new(10, 2, 10.0);
        source.observe_mid(Price::ZERO);
        source.observe_mid(Price::new(dec!(100)));
        assert_eq!(source.sample_count(), 0);
    }
}
