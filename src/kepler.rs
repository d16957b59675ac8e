use roots::{find_root_newton_raphson, SimpleConvergency};
use std::f64::consts::PI;

use crate::{constants::DPI, rotcol_errors::RotcolError};

/// Principal value of an angle in radians, in [0, 2π).
pub fn principal_angle(a: f64) -> f64 {
    a.rem_euclid(DPI)
}

/// Principal difference `a − b` between two angles, in [-π, π].
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let a = principal_angle(a);
    let b = principal_angle(b);

    let mut diff = a - b;

    if diff > PI {
        diff -= DPI;
    } else if diff < -PI {
        diff += DPI;
    }

    diff
}

/// Solve Kepler's equation `E − e·sin(E) = M` for the eccentric anomaly `E`.
///
/// Newton–Raphson iteration started from `M + e·sin(M)` (or π for high
/// eccentricities, where the simple starter overshoots).
///
/// Arguments
/// -----------------
/// * `mean_anomaly`: mean anomaly `M` in radians (any range).
/// * `eccentricity`: orbital eccentricity, `0 ≤ e < 1`.
///
/// Return
/// ----------
/// * The eccentric anomaly in radians, in the same revolution as `principal_angle(M)`,
///   or [`RotcolError::KeplerSolverFailed`] if Newton–Raphson does not converge.
pub fn solve_kepler_equation(mean_anomaly: f64, eccentricity: f64) -> Result<f64, RotcolError> {
    let m = principal_angle(mean_anomaly);
    if eccentricity == 0.0 {
        return Ok(m);
    }

    let f = |e_anom: f64| -> f64 { e_anom - eccentricity * e_anom.sin() - m };
    let df = |e_anom: f64| -> f64 { 1.0 - eccentricity * e_anom.cos() };

    let x0 = if eccentricity < 0.8 {
        m + eccentricity * m.sin()
    } else {
        PI
    };

    let mut tol = SimpleConvergency {
        eps: f64::EPSILON * 1e2,
        max_iter: 30,
    };

    Ok(find_root_newton_raphson(x0, &f, &df, &mut tol)?)
}

#[cfg(test)]
mod kepler_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_principal_angle() {
        assert_relative_eq!(principal_angle(-0.5), DPI - 0.5, epsilon = 1e-15);
        assert_relative_eq!(principal_angle(DPI + 0.25), 0.25, epsilon = 1e-15);
    }

    #[test]
    fn test_angle_diff() {
        assert_relative_eq!(angle_diff(0.1, DPI - 0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(angle_diff(DPI - 0.1, 0.1), -0.2, epsilon = 1e-12);
        assert_relative_eq!(angle_diff(1.0, 0.5), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_kepler_equation() {
        for &e in &[0.0, 0.001, 0.1, 0.5, 0.9] {
            for &m in &[0.0, 0.3, 1.7, 3.0, 5.9] {
                let e_anom = solve_kepler_equation(m, e).unwrap();
                assert_relative_eq!(e_anom - e * e_anom.sin(), m, epsilon = 1e-12);
            }
        }
    }
}
