//! Scalar special functions on `f64`.
//!
//! Reference implementations used by constant folding and by the array
//! backend. Accuracy targets a few ULP over the ranges the rewrites produce.
//!
//! References:
//! - Giles, "Approximating the erfinv function", GPU Computing Gems (2011)
//! - Abramowitz & Stegun 7.1.6 / 7.1.14 (erf series and erfc continued fraction)

use std::f64::consts::{FRAC_2_SQRT_PI, LN_2, PI};

// ============================================================================
// Constants
// ============================================================================

/// Giles' erfinv coefficients for the central region (`w < 5`).
const ERFINV_CENTRAL: &[f64] = &[
    2.810_226_36e-8,
    3.432_739_39e-7,
    -3.523_387_7e-6,
    -4.391_506_54e-6,
    2.185_808_7e-4,
    -1.253_725_03e-3,
    -4.177_681_64e-3,
    2.466_407_27e-1,
    1.501_409_41,
];

/// Giles' erfinv coefficients for the tails (`w >= 5`).
const ERFINV_TAIL: &[f64] = &[
    -2.002_142_57e-4,
    1.009_505_58e-4,
    1.349_343_22e-3,
    -3.673_428_44e-3,
    5.739_507_73e-3,
    -7.622_461_3e-3,
    9.438_870_47e-3,
    1.001_674_06,
    2.832_976_82,
];

/// Asymptotic digamma coefficients `B_2k / 2k` for `1/x^2k`, k = 1..7.
const DIGAMMA_ASYMPTOTIC: &[f64] = &[
    1.0 / 12.0,
    -1.0 / 120.0,
    1.0 / 252.0,
    -1.0 / 240.0,
    1.0 / 132.0,
    -691.0 / 32760.0,
    1.0 / 12.0,
];

/// Below this magnitude erf uses its power series, above it the erfc fraction.
const ERF_SERIES_LIMIT: f64 = 2.0;

/// Depth of the backward-evaluated erfc continued fraction.
const ERFC_FRACTION_DEPTH: usize = 80;

// ============================================================================
// Helpers
// ============================================================================

/// Horner evaluation with coefficients ordered from highest degree.
fn horner(x: f64, coeffs: &[f64]) -> f64 {
    coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
}

/// erf by the everywhere-positive series `2/sqrt(pi) e^{-x^2} sum 2^n x^{2n+1} / (2n+1)!!`.
fn erf_series(x: f64) -> f64 {
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    let mut n = 0.0;
    while term.abs() > sum.abs() * f64::EPSILON * 0.25 {
        n += 1.0;
        term *= 2.0 * x2 / (2.0 * n + 1.0);
        sum += term;
    }
    FRAC_2_SQRT_PI * (-x2).exp() * sum
}

/// erfc for `x >= ERF_SERIES_LIMIT` via the Laplace continued fraction.
fn erfc_fraction(x: f64) -> f64 {
    let mut k = x;
    for n in (1..=ERFC_FRACTION_DEPTH).rev() {
        k = x + (n as f64 * 0.5) / k;
    }
    (-x * x).exp() / (PI.sqrt() * k)
}

// ============================================================================
// Error function family
// ============================================================================

pub fn erf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x.abs() < ERF_SERIES_LIMIT {
        erf_series(x)
    } else {
        (1.0 - erfc_fraction(x.abs())).copysign(x)
    }
}

pub fn erfc(x: f64) -> f64 {
    if x.is_nan() {
        f64::NAN
    } else if x < 0.0 {
        2.0 - erfc(-x)
    } else if x < ERF_SERIES_LIMIT {
        1.0 - erf_series(x)
    } else {
        erfc_fraction(x)
    }
}

/// Inverse of [`erf`] on `[-1, 1]`; NaN outside.
pub fn erfinv(y: f64) -> f64 {
    if y.is_nan() || y.abs() > 1.0 {
        return f64::NAN;
    }
    if y == 1.0 {
        return f64::INFINITY;
    }
    if y == -1.0 {
        return f64::NEG_INFINITY;
    }

    let w = -((1.0 - y) * (1.0 + y)).ln();
    let mut x = if w < 5.0 { horner(w - 2.5, ERFINV_CENTRAL) * y } else { horner(w.sqrt() - 3.0, ERFINV_TAIL) * y };

    // Newton refinement; near the tails refine against erfc to keep 1 - |y| exact.
    for _ in 0..3 {
        let slope = FRAC_2_SQRT_PI * (-x * x).exp();
        if slope == 0.0 {
            break;
        }
        let residual = if y.abs() > 0.5 {
            let tail = (1.0 - y.abs()) - erfc(x.abs());
            if y > 0.0 { tail } else { -tail }
        } else {
            erf(x) - y
        };
        x -= residual / slope;
    }
    x
}

// ============================================================================
// Gamma family
// ============================================================================

/// Digamma (psi) function. Poles at non-positive integers yield NaN.
pub fn digamma(x: f64) -> f64 {
    if x.is_nan() || x == f64::NEG_INFINITY {
        return f64::NAN;
    }
    if x <= 0.0 && x == x.floor() {
        return f64::NAN;
    }
    if x < 0.0 {
        return digamma(1.0 - x) - PI / (PI * x).tan();
    }

    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc -= 1.0 / x;
        x += 1.0;
    }
    let inv2 = 1.0 / (x * x);
    let series = DIGAMMA_ASYMPTOTIC.iter().rev().fold(0.0, |s, &c| (s + c) * inv2);
    acc + x.ln() - 0.5 / x - series
}

// ============================================================================
// Log-space helpers
// ============================================================================

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(x))` with the branch thresholds -37, 18 and 33.3.
pub fn softplus(x: f64) -> f64 {
    if x < -37.0 {
        x.exp()
    } else if x < 18.0 {
        x.exp().ln_1p()
    } else if x < 33.3 {
        x + (-x).exp()
    } else {
        x
    }
}

/// `log(1 - exp(x))` branching at `x < ln(0.5)`.
pub fn log1mexp(x: f64) -> f64 {
    if x < -LN_2 { (-x.exp()).ln_1p() } else { (-x.exp_m1()).ln() }
}
