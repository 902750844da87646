//! Weighted similarity scorers over behavioral signatures.
//!
//! Both scorers are a weighted mean over only the feature pairs where both
//! sides carry signal; an absent-on-either-side pair is excluded from both
//! numerator and denominator rather than penalized as zero. A comparison with
//! no present pairs scores 0 (no evidence of similarity), never an error.

use crate::BehavioralSignature;

struct WeightedMean {
    numerator: f64,
    denominator: f64,
}

impl WeightedMean {
    fn new() -> Self {
        Self {
            numerator: 0.0,
            denominator: 0.0,
        }
    }

    fn add(&mut self, weight: f64, factor: Option<f64>) {
        if let Some(factor) = factor {
            self.numerator += weight * factor;
            self.denominator += weight;
        }
    }

    fn finish(self) -> f64 {
        if self.denominator > 0.0 {
            self.numerator / self.denominator
        } else {
            0.0
        }
    }
}

/// Relative-difference factor for a positive numeric pair: `1 - |a-b|/max`.
/// Either side at or below zero means "no signal" and omits the pair.
fn relative(a: f64, b: f64) -> Option<f64> {
    if a <= 0.0 || b <= 0.0 {
        return None;
    }
    Some(1.0 - (a - b).abs() / a.max(b))
}

/// Absolute-difference factor for a unit-interval pair, floored at zero.
fn absolute_unit(a: f64, b: f64) -> Option<f64> {
    if a <= 0.0 || b <= 0.0 {
        return None;
    }
    Some((1.0 - (a - b).abs()).max(0.0))
}

/// Exact-match factor for categorical pairs; empty means "no signal".
fn exact(a: &str, b: &str) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some(if a == b { 1.0 } else { 0.0 })
}

/// Same-device, suspected-different-user similarity. Leans on interaction
/// style signals that differ between humans sharing one machine.
pub fn behavioral_similarity(a: &BehavioralSignature, b: &BehavioralSignature) -> f64 {
    let mut mean = WeightedMean::new();
    mean.add(0.3, relative(a.typing_wpm, b.typing_wpm));
    mean.add(0.2, absolute_unit(a.typing_rhythm, b.typing_rhythm));
    mean.add(0.2, relative(a.pointer_velocity, b.pointer_velocity));
    mean.add(0.15, exact(&a.click_pattern, &b.click_pattern));
    mean.add(0.1, exact(&a.timezone_pattern, &b.timezone_pattern));
    mean.add(0.05, exact(&a.keyboard_language, &b.keyboard_language));
    mean.finish()
}

/// Same-user, different-device similarity. Pointer and click signals are
/// device-specific and deliberately excluded.
pub fn cross_device_similarity(a: &BehavioralSignature, b: &BehavioralSignature) -> f64 {
    let mut mean = WeightedMean::new();
    mean.add(0.4, relative(a.typing_wpm, b.typing_wpm));
    mean.add(0.3, absolute_unit(a.typing_rhythm, b.typing_rhythm));
    mean.add(0.2, exact(&a.timezone_pattern, &b.timezone_pattern));
    mean.add(0.1, exact(&a.keyboard_language, &b.keyboard_language));
    mean.finish()
}
