//! Rewrite budget configuration.
//!
//! Built explicitly with the bon builder or read from the environment.

use std::time::{Duration, Instant};

use bon::bon;

/// Limits for fixed-point rewriting.
///
/// Exhausting a limit stops rewriting early; it is reported, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Maximum number of full passes an equilibrium rewriter runs.
    pub max_passes: usize,
    /// Maximum number of replacements across one `apply` call.
    pub max_rewrites: usize,
    /// Wall-clock limit for one `apply` call.
    pub time_budget: Option<Duration>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self { max_passes: 100, max_rewrites: 10_000, time_budget: None }
    }
}

#[bon]
impl RewriteConfig {
    #[builder(finish_fn = build)]
    pub fn builder(
        #[builder(default = 100)] max_passes: usize,
        #[builder(default = 10_000)] max_rewrites: usize,
        time_budget: Option<Duration>,
    ) -> Self {
        Self { max_passes, max_rewrites, time_budget }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_REWRITE_MAX_PASSES` - Maximum equilibrium passes (default: 100)
    /// * `TESSERA_REWRITE_MAX_REWRITES` - Maximum replacements (default: 10000)
    /// * `TESSERA_REWRITE_TIME_BUDGET_MS` - Time budget in milliseconds (default: unlimited)
    pub fn from_env() -> Self {
        let max_passes = std::env::var("TESSERA_REWRITE_MAX_PASSES").ok().and_then(|s| s.parse().ok()).unwrap_or(100);
        let max_rewrites =
            std::env::var("TESSERA_REWRITE_MAX_REWRITES").ok().and_then(|s| s.parse().ok()).unwrap_or(10_000);
        let time_budget = std::env::var("TESSERA_REWRITE_TIME_BUDGET_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis);
        Self { max_passes, max_rewrites, time_budget }
    }

    pub(crate) fn budget(&self) -> Budget {
        Budget {
            deadline: self.time_budget.map(|d| Instant::now() + d),
            max_rewrites: self.max_rewrites,
            used: 0,
        }
    }
}

/// Remaining allowance of one `apply` call.
#[derive(Debug, Clone)]
pub(crate) struct Budget {
    deadline: Option<Instant>,
    max_rewrites: usize,
    used: usize,
}

impl Budget {
    pub(crate) fn spend(&mut self) {
        self.used += 1;
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.used >= self.max_rewrites || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
