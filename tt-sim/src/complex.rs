//! Complex exponential integral.
//!
//! The closed-form flight solution rotates the horizontal velocity by a
//! spin-dependent angle while drag shrinks it. Integrating that rotation over
//! time produces exponential integrals of purely imaginary (and, for fast spin
//! decay, mixed) arguments, so we need `Ei` over the whole complex plane.
//!
//! ```text
//! E1(z) = ∫_z^∞ e^(-s)/s ds          Ei(z) = -E1(-z) + iπ·sgn(Im z)
//! d/dz Ei(z) = e^z / z
//! ```
//!
//! Two regimes:
//! - power series near the origin and along the negative real axis, where
//!   the continued fraction converges slowly;
//! - modified Lentz continued fraction everywhere else.

use std::f64::consts::PI;

use num_complex::Complex64;

/// Euler–Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

const SERIES_RADIUS: f64 = 3.0;
const NEGATIVE_AXIS_RADIUS: f64 = 30.0;
const MAX_TERMS: usize = 500;
const TOLERANCE: f64 = 1e-16;

/// Exponential integral `E1(z)` (principal branch).
///
/// Returns an infinite value at `z = 0`.
pub fn e1(z: Complex64) -> Complex64 {
    let radius = z.norm();
    if radius == 0.0 {
        return Complex64::new(f64::INFINITY, 0.0);
    }
    if radius < SERIES_RADIUS || (z.re < 0.0 && radius < NEGATIVE_AXIS_RADIUS) {
        e1_series(z)
    } else {
        e1_continued_fraction(z)
    }
}

/// Exponential integral `Ei(z) = γ + ln z + Σ zⁿ/(n·n!)`, principal branch.
///
/// Off the real axis this is `-E1(-z) ± iπ` (sign of `Im z`). On the real
/// axis only the real part is returned: the Cauchy principal value for
/// `z > 0`, `-E1(-z)` for `z < 0`.
pub fn ei(z: Complex64) -> Complex64 {
    let value = -e1(-z);
    if z.im == 0.0 {
        return Complex64::new(value.re, 0.0);
    }
    Complex64::new(value.re, value.im + PI.copysign(z.im))
}

/// `d/dz Ei(z) = e^z / z`
pub fn ei_derivative(z: Complex64) -> Complex64 {
    z.exp() / z
}

// E1(z) = -γ - ln z - Σ_{n≥1} (-z)^n / (n·n!)
fn e1_series(z: Complex64) -> Complex64 {
    let mut sum = Complex64::new(0.0, 0.0);
    let mut term = Complex64::new(1.0, 0.0);
    for n in 1..MAX_TERMS {
        let n = n as f64;
        term *= -z / n;
        let contribution = term / n;
        sum += contribution;
        if contribution.norm() < TOLERANCE * sum.norm().max(1.0) {
            break;
        }
    }
    -EULER_GAMMA - z.ln() - sum
}

// E1(z) = e^(-z) / (z + 1 - 1²/(z + 3 - 2²/(z + 5 - ...)))
fn e1_continued_fraction(z: Complex64) -> Complex64 {
    let tiny = 1e-300;
    let mut b = z + 1.0;
    let mut c = Complex64::new(1.0 / tiny, 0.0);
    let mut d = Complex64::new(1.0, 0.0) / b;
    let mut h = d;
    for i in 1..MAX_TERMS {
        let i = i as f64;
        let a = -i * i;
        b += 2.0;
        d = Complex64::new(1.0, 0.0) / (d * a + b);
        c = b + c.inv() * a;
        let delta = c * d;
        h *= delta;
        if (delta - 1.0).norm() < TOLERANCE {
            break;
        }
    }
    h * (-z).exp()
}
