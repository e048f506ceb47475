use serde::{Deserialize, Serialize};

/// Second-order calibration of one analog channel
///
/// `value = (raw * raw * multiplier_2 + raw * multiplier + offset) / divider`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub multiplier: f64,
    pub multiplier_2: f64,
    pub offset: f64,
    pub divider: f64,
}

impl CalibrationParams {
    /// First-order calibration, as used by the voltage channel
    pub fn linear(multiplier: f64, offset: f64) -> Self {
        Self {
            multiplier,
            multiplier_2: 0.0,
            offset,
            divider: 1.0,
        }
    }

    pub fn identity() -> Self {
        Self::linear(1.0, 0.0)
    }

    /// Map a raw sample to physical units
    pub fn apply(&self, raw: f64) -> f64 {
        (raw * raw * self.multiplier_2 + raw * self.multiplier + self.offset) / self.divider
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_voltage_divider() {
        // 0..5 V ADC behind an 11:1 divider
        let cal = CalibrationParams::linear(11.0, 0.0);
        assert!((cal.apply(4.5) - 49.5).abs() < 1e-9);
        assert!((cal.apply(0.0)).abs() < 1e-12);
    }

    #[test]
    fn quadratic_current_with_divider() {
        let cal = CalibrationParams {
            multiplier: 12.5,
            multiplier_2: -0.75,
            offset: 0.2,
            divider: 4.0,
        };
        // (1.2*1.2*-0.75 + 1.2*12.5 + 0.2) / 4 = (-1.08 + 15 + 0.2) / 4 = 3.53
        assert!((cal.apply(1.2) - 3.53).abs() < 1e-9);
    }

    #[test]
    fn same_input_same_output() {
        let cal = CalibrationParams {
            multiplier: 1.7,
            multiplier_2: 0.01,
            offset: -0.3,
            divider: 1.5,
        };
        let first = cal.apply(2.25);
        for _ in 0..10 {
            assert_eq!(cal.apply(2.25), first);
        }
    }
}
