// Wheel state and steering angle arithmetic

use std::f64::consts::{FRAC_PI_2, PI};
use std::ops::{Add, Neg, Sub};

/// A heading on the unit circle, always reported in (-pi, pi]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation2d {
    radians: f64,
}

impl Rotation2d {
    pub fn from_radians(radians: f64) -> Self {
        // atan2 folds any input onto (-pi, pi]
        Self {
            radians: radians.sin().atan2(radians.cos()),
        }
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }
}

impl Add for Rotation2d {
    type Output = Rotation2d;

    fn add(self, rhs: Rotation2d) -> Rotation2d {
        Rotation2d::from_radians(self.radians + rhs.radians)
    }
}

impl Sub for Rotation2d {
    type Output = Rotation2d;

    fn sub(self, rhs: Rotation2d) -> Rotation2d {
        Rotation2d::from_radians(self.radians - rhs.radians)
    }
}

impl Neg for Rotation2d {
    type Output = Rotation2d;

    fn neg(self) -> Rotation2d {
        Rotation2d::from_radians(-self.radians)
    }
}

/// Speed (m/s) and steering angle of one wheel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModuleState {
    pub speed: f64,
    pub angle: Rotation2d,
}

impl SwerveModuleState {
    pub fn new(speed: f64, angle: Rotation2d) -> Self {
        Self { speed, angle }
    }

    /// Equivalent state that never needs more than a quarter turn of steering
    ///
    /// When the target is more than 90 degrees away from `current`, the wheel
    /// points the other way and runs backwards instead.
    pub fn optimize(self, current: Rotation2d) -> Self {
        let delta = self.angle - current;
        if delta.radians().abs() > FRAC_PI_2 {
            Self {
                speed: -self.speed,
                angle: self.angle + Rotation2d::from_radians(PI),
            }
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn sweep() -> impl Iterator<Item = f64> {
        // roughly -2pi..2pi in 7.5 degree steps
        (-48..=48).map(|i| (i as f64 * 7.5 + 0.3).to_radians())
    }

    #[test]
    fn test_rotation_normalizes() {
        let r = Rotation2d::from_radians(3.0 * PI / 2.0);
        assert!((r.radians() + FRAC_PI_2).abs() < EPS);

        let r = Rotation2d::from_degrees(-270.0);
        assert!((r.degrees() - 90.0).abs() < EPS);

        let diff = Rotation2d::from_degrees(170.0) - Rotation2d::from_degrees(-170.0);
        assert!((diff.degrees() + 20.0).abs() < EPS);
    }

    #[test]
    fn test_optimize_keeps_quarter_turn() {
        let current = Rotation2d::from_radians(-FRAC_PI_2);
        let target = SwerveModuleState::new(1.0, Rotation2d::from_radians(0.0));
        let optimized = target.optimize(current);
        assert_eq!(optimized, target);
    }

    #[test]
    fn test_optimize_flips_half_turn() {
        let current = Rotation2d::from_radians(-FRAC_PI_2);
        let target = SwerveModuleState::new(1.0, Rotation2d::from_radians(FRAC_PI_2));
        let optimized = target.optimize(current);

        assert_eq!(optimized.speed, -1.0);
        assert!((optimized.angle - current).radians().abs() < EPS);
    }

    #[test]
    fn test_optimize_adjusts_by_zero_or_pi() {
        for cur in sweep() {
            for tgt in sweep() {
                let target = SwerveModuleState::new(2.0, Rotation2d::from_radians(tgt));
                let optimized = target.optimize(Rotation2d::from_radians(cur));

                let shift = (optimized.angle - target.angle).radians().abs();
                let flipped = optimized.speed < 0.0;
                if flipped {
                    assert!((shift - PI).abs() < EPS, "cur={} tgt={}", cur, tgt);
                } else {
                    assert!(shift < EPS, "cur={} tgt={}", cur, tgt);
                }
                assert_eq!(optimized.speed.abs(), 2.0);
            }
        }
    }

    #[test]
    fn test_optimize_never_exceeds_quarter_turn() {
        for cur in sweep() {
            for tgt in sweep() {
                let current = Rotation2d::from_radians(cur);
                let optimized =
                    SwerveModuleState::new(1.0, Rotation2d::from_radians(tgt)).optimize(current);
                let travel = (optimized.angle - current).radians().abs();
                assert!(travel <= FRAC_PI_2 + EPS, "cur={} tgt={} travel={}", cur, tgt, travel);
            }
        }
    }
}
