//! Fallback resolver
//!
//! Tries a metric's providers in tier order and returns the first value
//! that passes validation, clamped into range. When every provider misses,
//! the emergency branch synthesizes a value from a buffer statistic or the
//! catalog constant. That branch is pure arithmetic and cannot fail.

use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

use super::catalog::{MetricRequest, MetricSpec};
use super::context::ExtractionContext;
use crate::types::{MetricResult, ProviderFailure, ProviderOutcome, Tier};

/// Default relative spread of the synthetic perturbation
pub const DEFAULT_SPREAD: f64 = 0.1;
/// Spread as a fraction of the range width when the base value is zero
const ZERO_BASE_SPREAD: f64 = 0.01;
/// Prefix of every synthetic provenance note
pub const SYNTHETIC_PREFIX: &str = "synthetic:";

#[derive(Debug, Clone)]
pub struct FallbackResolver {
    spread: f64,
}

impl Default for FallbackResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SPREAD)
    }
}

impl FallbackResolver {
    pub fn new(spread: f64) -> Self {
        Self {
            spread: spread.clamp(0.0, 0.5),
        }
    }

    /// Resolve one metric; always returns an in-range result
    pub fn resolve(&self, request: &MetricRequest, ctx: &ExtractionContext<'_>) -> MetricResult {
        let spec = &request.spec;
        let mut misses: Vec<(&'static str, ProviderFailure)> = Vec::new();

        for provider in &request.providers {
            let outcome = run_provider(|| provider.provide(spec.name, ctx));
            match validate(spec, outcome) {
                Ok((value, clamped_from)) => {
                    debug!(
                        metric = spec.name,
                        tier = %provider.tier(),
                        provider = provider.name(),
                        value = value,
                        "Metric resolved"
                    );
                    let mut note = provider.name().to_string();
                    if let Some(raw) = clamped_from {
                        note.push_str(&format!(" (clamped from {:.4})", raw));
                    }
                    if !misses.is_empty() {
                        note.push_str(&format!("; after {}", describe_misses(&misses)));
                    }
                    return MetricResult {
                        name: spec.name.to_string(),
                        value,
                        unit: spec.unit.to_string(),
                        tier_used: provider.tier(),
                        provenance_note: note,
                    };
                }
                Err(failure) => {
                    debug!(
                        metric = spec.name,
                        tier = %provider.tier(),
                        provider = provider.name(),
                        reason = %failure,
                        "Provider missed"
                    );
                    misses.push((provider.name(), failure));
                }
            }
        }

        self.synthesize_after(spec, ctx, &misses)
    }

    /// Emergency branch on its own
    pub fn synthesize(&self, spec: &MetricSpec, ctx: &ExtractionContext<'_>) -> MetricResult {
        self.synthesize_after(spec, ctx, &[])
    }

    fn synthesize_after(
        &self,
        spec: &MetricSpec,
        ctx: &ExtractionContext<'_>,
        misses: &[(&'static str, ProviderFailure)],
    ) -> MetricResult {
        let (base, source) = match spec.statistic.evaluate(ctx.audio()) {
            Some(value) => (value, spec.statistic.label()),
            None => (spec.constant, "population constant"),
        };

        let spread = if base == 0.0 {
            (spec.hi - spec.lo) * ZERO_BASE_SPREAD
        } else {
            base.abs() * self.spread
        };
        let u = stable_unit(ctx.recording_id(), spec.name);
        let value = spec.clamp(base + u * spread);

        let mut note = format!("{} {}", SYNTHETIC_PREFIX, source);
        if !misses.is_empty() {
            note.push_str(&format!("; after {}", describe_misses(misses)));
        }

        warn!(
            metric = spec.name,
            recording_id = ctx.recording_id(),
            value = value,
            source = source,
            "Metric degraded to emergency tier"
        );

        MetricResult {
            name: spec.name.to_string(),
            value,
            unit: spec.unit.to_string(),
            tier_used: Tier::Emergency,
            provenance_note: note,
        }
    }
}

/// Deterministic value in [-1, 1] for a recording and metric
///
/// First 8 bytes of SHA-256(`recording_id:metric`), scaled.
pub fn stable_unit(recording_id: &str, metric: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(recording_id.as_bytes());
    hasher.update(b":");
    hasher.update(metric.as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let x = u64::from_be_bytes(head);
    (x as f64 / u64::MAX as f64) * 2.0 - 1.0
}

/// Accepted value plus the raw value when clamping changed it
fn validate(spec: &MetricSpec, outcome: ProviderOutcome) -> Result<(f64, Option<f64>), ProviderFailure> {
    let raw = outcome?;
    if !raw.is_finite() {
        return Err(ProviderFailure::Implausible(raw));
    }
    if spec.strictly_positive && raw <= 0.0 {
        return Err(ProviderFailure::NonPositive(raw));
    }
    let value = spec.clamp(raw);
    Ok((value, (value != raw).then_some(raw)))
}

/// A panicking provider is a miss like any other
fn run_provider(call: impl FnOnce() -> ProviderOutcome) -> ProviderOutcome {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ProviderFailure::Computation(format!("provider panicked: {}", message)))
    })
}

fn describe_misses(misses: &[(&'static str, ProviderFailure)]) -> String {
    misses
        .iter()
        .map(|(name, failure)| format!("{} {}", name, failure))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NormalizedAudio;
    use crate::extraction::catalog::{lookup, MetricRequest, JITTER_LOCAL_PERCENT, MEAN_PITCH_HZ, MFCC_1_MEAN};
    use crate::providers::MetricProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        tier: Tier,
        outcome: ProviderOutcome,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, tier: Tier, outcome: ProviderOutcome) -> Arc<Self> {
            Arc::new(Self {
                name,
                tier,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl MetricProvider for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn tier(&self) -> Tier {
            self.tier
        }
        fn metrics(&self) -> &'static [&'static str] {
            &[MEAN_PITCH_HZ, JITTER_LOCAL_PERCENT, MFCC_1_MEAN]
        }
        fn provide(&self, _metric: &str, _ctx: &ExtractionContext<'_>) -> ProviderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct Panicking;

    impl MetricProvider for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn tier(&self) -> Tier {
            Tier::Primary
        }
        fn metrics(&self) -> &'static [&'static str] {
            &[MEAN_PITCH_HZ]
        }
        fn provide(&self, _metric: &str, _ctx: &ExtractionContext<'_>) -> ProviderOutcome {
            panic!("toolkit exploded")
        }
    }

    fn audio() -> NormalizedAudio {
        NormalizedAudio::from_samples(vec![0.0; 2048], 22_050, "r.wav")
    }

    fn request(metric: &str, providers: Vec<Arc<dyn MetricProvider>>) -> MetricRequest {
        MetricRequest::build(*lookup(metric).unwrap(), &providers)
    }

    fn shared<P: MetricProvider + 'static>(provider: Arc<P>) -> Arc<dyn MetricProvider> {
        provider
    }

    #[test]
    fn test_first_valid_tier_wins() {
        let primary = Fixed::new("primary", Tier::Primary, Ok(180.0));
        let secondary = Fixed::new("secondary", Tier::Secondary, Ok(200.0));
        let req = request(MEAN_PITCH_HZ, vec![shared(secondary.clone()), shared(primary.clone())]);
        let audio = audio();
        let ctx = ExtractionContext::new("rec", &audio);

        let result = FallbackResolver::default().resolve(&req, &ctx);
        assert_eq!(result.tier_used, Tier::Primary);
        assert_eq!(result.value, 180.0);
        assert_eq!(result.unit, "Hz");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_values_fall_through() {
        let nan = Fixed::new("nan", Tier::Primary, Ok(f64::NAN));
        let zero = Fixed::new("zero", Tier::Secondary, Ok(0.0));
        let good = Fixed::new("good", Tier::Secondary, Ok(1.5));
        let req = request(JITTER_LOCAL_PERCENT, vec![shared(nan), shared(zero), shared(good)]);
        let audio = audio();
        let ctx = ExtractionContext::new("rec", &audio);

        let result = FallbackResolver::default().resolve(&req, &ctx);
        assert_eq!(result.tier_used, Tier::Secondary);
        assert_eq!(result.value, 1.5);
        assert!(result.provenance_note.starts_with("good"));
        assert!(result.provenance_note.contains("nan implausible"));
        assert!(result.provenance_note.contains("zero non-positive"));
    }

    #[test]
    fn test_zero_accepted_when_not_strictly_positive() {
        let zero = Fixed::new("zero", Tier::Secondary, Ok(0.0));
        let req = request(MFCC_1_MEAN, vec![shared(zero)]);
        let audio = audio();
        let ctx = ExtractionContext::new("rec", &audio);
        let result = FallbackResolver::default().resolve(&req, &ctx);
        assert_eq!(result.tier_used, Tier::Secondary);
        assert_eq!(result.value, 0.0);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let high = Fixed::new("high", Tier::Primary, Ok(900.0));
        let req = request(MEAN_PITCH_HZ, vec![shared(high)]);
        let audio = audio();
        let ctx = ExtractionContext::new("rec", &audio);
        let result = FallbackResolver::default().resolve(&req, &ctx);
        assert_eq!(result.value, 400.0);
        assert!(result.provenance_note.contains("clamped from 900"));
    }

    #[test]
    fn test_all_failures_synthesize() {
        let miss = Fixed::new(
            "miss",
            Tier::Secondary,
            Err(ProviderFailure::InsufficientSignal("no voicing".into())),
        );
        let req = request(MEAN_PITCH_HZ, vec![shared(miss)]);
        let audio = audio();
        let ctx = ExtractionContext::new("rec", &audio);
        let result = FallbackResolver::default().resolve(&req, &ctx);
        assert_eq!(result.tier_used, Tier::Emergency);
        assert!(result.is_synthetic());
        assert!(result.provenance_note.starts_with(SYNTHETIC_PREFIX));
        // silent buffer: 120 + 200 * 0 = 120, perturbed by at most 10%
        assert!((108.0..=132.0).contains(&result.value), "got {}", result.value);
    }

    #[test]
    fn test_panicking_provider_is_a_miss() {
        let fallback = Fixed::new("fallback", Tier::Secondary, Ok(150.0));
        let req = request(MEAN_PITCH_HZ, vec![shared(Arc::new(Panicking)), shared(fallback)]);
        let audio = audio();
        let ctx = ExtractionContext::new("rec", &audio);
        let result = FallbackResolver::default().resolve(&req, &ctx);
        assert_eq!(result.tier_used, Tier::Secondary);
        assert!(result.provenance_note.contains("provider panicked"));
    }

    #[test]
    fn test_synthesis_is_deterministic_per_recording() {
        let spec = *lookup(JITTER_LOCAL_PERCENT).unwrap();
        let audio = audio();
        let resolver = FallbackResolver::default();
        let a = resolver.synthesize(&spec, &ExtractionContext::new("rec-a", &audio));
        let again = resolver.synthesize(&spec, &ExtractionContext::new("rec-a", &audio));
        let b = resolver.synthesize(&spec, &ExtractionContext::new("rec-b", &audio));
        assert_eq!(a.value, again.value);
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn test_zero_base_uses_range_spread() {
        let spec = *lookup(MFCC_1_MEAN).unwrap();
        let audio = audio();
        let result = FallbackResolver::default().synthesize(&spec, &ExtractionContext::new("rec", &audio));
        // constant 0, spread 1% of 2000
        assert!(result.value.abs() <= 20.0);
    }

    #[test]
    fn test_stable_unit_range() {
        for i in 0..200 {
            let u = stable_unit(&format!("recording-{}", i), "mean_pitch_hz");
            assert!((-1.0..=1.0).contains(&u));
        }
        assert_eq!(stable_unit("x", "y"), stable_unit("x", "y"));
    }
}
