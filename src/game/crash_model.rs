//! Crash condition strategies
//!
//! The scheduler only ever asks one question per tick: "should the round
//! crash now, at this multiplier?". Anything that answers it can drive a
//! round, so the per-tick hazard policy and the pre-sampled policy are
//! interchangeable.

use super::types::Multiplier;
use crate::config::{CrashConfig, CrashPolicy};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Strategy deciding when the multiplier crashes
pub trait CrashModel: Send {
    /// Called once when a round enters Active, before the first tick
    fn begin_round(&mut self) {}

    /// Whether the round crashes at `current` (already rounded to hundredths)
    fn should_crash(&mut self, current: Multiplier) -> bool;
}

/// Per-tick crash probability: `min((m - 1) / divisor, cap)`
pub fn hazard_probability(current: Multiplier, divisor: f64, cap: f64) -> f64 {
    let excess = (current.as_f64() - 1.0).max(0.0);
    (excess / divisor).min(cap)
}

/// Dynamic-hazard policy: the crash point emerges from accumulated
/// per-tick risk, bounded by a hard ceiling.
pub struct HazardCrashModel<R = StdRng> {
    divisor: f64,
    cap: f64,
    ceiling: Multiplier,
    rng: R,
}

impl HazardCrashModel<StdRng> {
    pub fn new(config: &CrashConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng + Send> HazardCrashModel<R> {
    pub fn with_rng(config: &CrashConfig, rng: R) -> Self {
        Self {
            divisor: config.hazard_divisor,
            cap: config.hazard_cap,
            ceiling: config.ceiling,
            rng,
        }
    }

    pub fn probability(&self, current: Multiplier) -> f64 {
        hazard_probability(current, self.divisor, self.cap)
    }
}

impl<R: Rng + Send> CrashModel for HazardCrashModel<R> {
    fn should_crash(&mut self, current: Multiplier) -> bool {
        if current >= self.ceiling {
            return true;
        }
        let p = self.probability(current);
        self.rng.gen::<f64>() < p
    }
}

/// Pre-sampled policy: one crash point per round, `1 + U^k * (max - 1)`,
/// which skews toward low multipliers for `k < 1`.
pub struct PresampledCrashModel<R = StdRng> {
    exponent: f64,
    max: Multiplier,
    target: Option<Multiplier>,
    rng: R,
}

impl PresampledCrashModel<StdRng> {
    pub fn new(config: &CrashConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng + Send> PresampledCrashModel<R> {
    pub fn with_rng(config: &CrashConfig, rng: R) -> Self {
        Self {
            exponent: config.presampled_exponent,
            max: config.presampled_max,
            target: None,
            rng,
        }
    }

    /// Crash point drawn for the current round, if any
    pub fn target(&self) -> Option<Multiplier> {
        self.target
    }

    fn sample(&mut self) -> Multiplier {
        let u: f64 = self.rng.gen();
        let raw = 1.0 + u.powf(self.exponent) * (self.max.as_f64() - 1.0);
        // A round must climb at least one step before it can crash.
        let floor = Multiplier::from_hundredths(101);
        Multiplier::from_f64(raw).map_or(floor, |m| m.max(floor))
    }
}

impl<R: Rng + Send> CrashModel for PresampledCrashModel<R> {
    fn begin_round(&mut self) {
        self.target = Some(self.sample());
    }

    fn should_crash(&mut self, current: Multiplier) -> bool {
        let target = match self.target {
            Some(target) => target,
            None => {
                let target = self.sample();
                self.target = Some(target);
                target
            }
        };
        current >= target
    }
}

/// Build the configured policy
pub fn build_crash_model(config: &CrashConfig) -> Box<dyn CrashModel> {
    match config.policy {
        CrashPolicy::Hazard => Box::new(HazardCrashModel::new(config)),
        CrashPolicy::Presampled => Box::new(PresampledCrashModel::new(config)),
    }
}
