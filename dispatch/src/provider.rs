//! Optional special-function providers.
//!
//! A few special functions have no implementation among the backend's own
//! primitives. They come from a [`SpecialFunctionProvider`] that the registry
//! loads lazily, once, through its [`ProviderSlot`]. A failed load is kept and
//! reported as [`Error::Unimplemented`](crate::Error::Unimplemented) by
//! resolution; it never panics.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::*;

/// Special functions supplied by an optional numeric library.
pub trait SpecialFunctionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Scaled complementary error function `exp(x^2) * erfc(x)`.
    fn erfcx(&self, x: f64) -> f64;

    /// Inverse of `erfc` on `[0, 2]`.
    fn erfcinv(&self, x: f64) -> f64;

    /// Exponentially scaled modified Bessel function `iv(v, x) * exp(-|x|)`.
    fn bessel_ive(&self, v: f64, x: f64) -> f64;
}

/// Loads a provider. Called at most once per slot.
pub type ProviderLoader = Arc<dyn Fn() -> Result<Arc<dyn SpecialFunctionProvider>> + Send + Sync>;

/// Name of the provider the default loader installs.
pub const DEFAULT_PROVIDER: &str = "statrs";

/// Lazily loaded provider.
pub struct ProviderSlot {
    name: String,
    loader: ProviderLoader,
    loaded: OnceCell<Result<Arc<dyn SpecialFunctionProvider>>>,
}

impl ProviderSlot {
    pub fn new(name: impl Into<String>, loader: ProviderLoader) -> Self {
        Self { name: name.into(), loader, loaded: OnceCell::new() }
    }

    /// Slot using [`default_loader`].
    pub fn with_default_loader() -> Self {
        Self::new(DEFAULT_PROVIDER, default_loader())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The provider, loading it on first use.
    pub fn get(&self) -> Result<Arc<dyn SpecialFunctionProvider>> {
        self.loaded
            .get_or_init(|| {
                let loaded = (self.loader)();
                match &loaded {
                    Ok(provider) => debug!(provider = provider.name(), "special-function provider loaded"),
                    Err(error) => warn!(provider = %self.name, %error, "special-function provider failed to load"),
                }
                loaded
            })
            .clone()
    }

    /// Whether a load was attempted.
    pub fn is_initialized(&self) -> bool {
        self.loaded.get().is_some()
    }
}

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("name", &self.name)
            .field("loaded", &self.loaded.get().map(|r| r.as_ref().map(|p| p.name().to_string())))
            .finish()
    }
}

/// Loader returning the `statrs`-backed provider when that feature is enabled.
pub fn default_loader() -> ProviderLoader {
    Arc::new(|| -> Result<Arc<dyn SpecialFunctionProvider>> {
        #[cfg(feature = "statrs")]
        {
            Ok(Arc::new(statrs_provider::StatrsProvider) as Arc<dyn SpecialFunctionProvider>)
        }
        #[cfg(not(feature = "statrs"))]
        {
            ProviderUnavailableSnafu { provider: DEFAULT_PROVIDER, reason: "built without the `statrs` feature" }.fail()
        }
    })
}

#[cfg(feature = "statrs")]
pub use statrs_provider::StatrsProvider;

#[cfg(feature = "statrs")]
mod statrs_provider {
    use std::f64::consts::PI;

    use statrs::function::erf::{erfc, erfc_inv};
    use statrs::function::gamma::ln_gamma;

    use super::SpecialFunctionProvider;

    /// Below this `erfcx` multiplies `exp(x^2)` and `erfc(x)` directly.
    const ERFCX_DIRECT_LIMIT: f64 = 5.0;
    const ERFCX_FRACTION_TERMS: usize = 120;
    /// Series terms allowed past `x`, where the terms are already falling.
    const IVE_SERIES_SLACK: usize = 500;
    /// Partial sums above this are folded into the running log scale.
    const IVE_RESCALE: f64 = 1e200;
    const IVE_ASYMPTOTIC_TERMS: usize = 40;

    /// Provider built on `statrs` special functions.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct StatrsProvider;

    impl SpecialFunctionProvider for StatrsProvider {
        fn name(&self) -> &str {
            super::DEFAULT_PROVIDER
        }

        fn erfcx(&self, x: f64) -> f64 {
            if x.is_nan() {
                f64::NAN
            } else if x < 0.0 {
                2.0 * (x * x).exp() - self.erfcx(-x)
            } else if x < ERFCX_DIRECT_LIMIT {
                (x * x).exp() * erfc(x)
            } else if x.is_infinite() {
                0.0
            } else {
                // Laplace continued fraction: erfcx(x) = 1 / (sqrt(pi) * (x + (1/2)/(x + 1/(x + (3/2)/(x + ...)))))
                let tail = (1..=ERFCX_FRACTION_TERMS).rev().fold(x, |acc, n| x + (n as f64 / 2.0) / acc);
                1.0 / (PI.sqrt() * tail)
            }
        }

        fn erfcinv(&self, x: f64) -> f64 {
            if x.is_nan() || !(0.0..=2.0).contains(&x) {
                return f64::NAN;
            }
            erfc_inv(x)
        }

        fn bessel_ive(&self, v: f64, x: f64) -> f64 {
            if v.is_nan() || x.is_nan() {
                return f64::NAN;
            }
            if v < 0.0 {
                // I_{-n} = I_n for integer n; other negative orders are not supported.
                return if v.fract() == 0.0 { self.bessel_ive(-v, x) } else { f64::NAN };
            }
            if x < 0.0 {
                // I_v(-x) = (-1)^v I_v(x), real only for integer orders.
                if v.fract() != 0.0 {
                    return f64::NAN;
                }
                let sign = if v % 2.0 == 0.0 { 1.0 } else { -1.0 };
                return sign * self.bessel_ive(v, -x);
            }
            if x == 0.0 {
                return if v == 0.0 { 1.0 } else { 0.0 };
            }
            if x.is_infinite() {
                return 0.0;
            }
            if x > 25.0 + v * v / 2.0 { ive_asymptotic(v, x) } else { ive_series(v, x) }
        }
    }

    /// Power series `sum_k (x/2)^(2k+v) / (k! Gamma(k+v+1))` scaled by `exp(-x)`.
    ///
    /// Terms grow until `k(k+v)` reaches `x^2/4`, so the sum runs until a term drops
    /// below rounding of the partial sum instead of for a fixed count. It is
    /// kept relative to a running log scale so neither the first term nor the
    /// largest one leaves the `f64` range.
    fn ive_series(v: f64, x: f64) -> f64 {
        let half = x / 2.0;
        let mut log_scale = v * half.ln() - ln_gamma(v + 1.0) - x;
        let (mut term, mut sum) = (1.0f64, 1.0f64);
        let max_terms = IVE_SERIES_SLACK.saturating_add(x.ceil() as usize);
        for k in 1..max_terms {
            let k = k as f64;
            term *= half * half / (k * (k + v));
            sum += term;
            if term < sum * f64::EPSILON {
                break;
            }
            if sum > IVE_RESCALE {
                log_scale += sum.ln();
                term /= sum;
                sum = 1.0;
            }
        }
        (sum.ln() + log_scale).exp()
    }

    /// Large-argument expansion, truncated at its smallest term.
    fn ive_asymptotic(v: f64, x: f64) -> f64 {
        let mu = 4.0 * v * v;
        let mut term = 1.0;
        let mut sum = 1.0;
        for k in 1..IVE_ASYMPTOTIC_TERMS {
            let odd = (2 * k - 1) as f64;
            let next = -term * (mu - odd * odd) / (k as f64 * 8.0 * x);
            if next.abs() >= term.abs() {
                break;
            }
            term = next;
            sum += term;
            if term.abs() < sum.abs() * f64::EPSILON {
                break;
            }
        }
        sum / (2.0 * PI * x).sqrt()
    }
}
