//! Cost Model
//!
//! Maps enabled duration and pipeline features to credits and price, and
//! gates runs on the caller's balance.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{segments::SegmentCollection, CoreError, CoreResult, Credits, TimeSec};

// =============================================================================
// Rates
// =============================================================================

/// Credits charged per second of generated video
pub const CREDITS_PER_SECOND: f64 = 10.0;

/// Price of one credit
pub const CENTS_PER_CREDIT: f64 = 0.5;

/// Price per second of generated video
pub const PRICE_CENTS_PER_SECOND: f64 = CREDITS_PER_SECOND * CENTS_PER_CREDIT;

/// Flat per-segment surcharges, in credits
pub const ENHANCEMENT_SURCHARGE: Credits = 20;
pub const CONTINUITY_SURCHARGE: Credits = 10;
pub const CAMERA_DIRECTION_SURCHARGE: Credits = 15;
pub const LIGHTING_SURCHARGE: Credits = 15;

/// `ceil(duration * CREDITS_PER_SECOND)`; non-positive durations cost nothing
pub fn credits_for_seconds(duration: TimeSec) -> Credits {
    if !duration.is_finite() || duration <= 0.0 {
        return 0;
    }
    (duration * CREDITS_PER_SECOND).ceil() as Credits
}

/// Price in cents, linear in duration
pub fn price_for_seconds(duration: TimeSec) -> f64 {
    if !duration.is_finite() || duration <= 0.0 {
        return 0.0;
    }
    duration * PRICE_CENTS_PER_SECOND
}

/// Price in cents of a credit amount
pub fn price_for_credits(credits: Credits) -> f64 {
    credits as f64 * CENTS_PER_CREDIT
}

// =============================================================================
// Features
// =============================================================================

/// Optional pipeline features that carry a per-segment surcharge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub enhancement: bool,
    /// Continuity frame injection
    pub continuity: bool,
    pub camera_direction: bool,
    pub lighting: bool,
}

impl FeatureSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            enhancement: true,
            continuity: true,
            camera_direction: true,
            lighting: true,
        }
    }

    /// Surcharge for one segment. The first enabled segment has no
    /// predecessor, so it never pays for continuity.
    pub fn surcharge_for_segment(&self, is_first: bool) -> Credits {
        let mut total = 0;
        if self.enhancement {
            total += ENHANCEMENT_SURCHARGE;
        }
        if self.continuity && !is_first {
            total += CONTINUITY_SURCHARGE;
        }
        if self.camera_direction {
            total += CAMERA_DIRECTION_SURCHARGE;
        }
        if self.lighting {
            total += LIGHTING_SURCHARGE;
        }
        total
    }
}

// =============================================================================
// Breakdown
// =============================================================================

/// Derived cost of a set of enabled segments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    /// Duration-based credits, rounded up per segment
    pub base_tokens: Credits,
    /// Sum of per-segment feature surcharges
    pub surcharge_tokens: Credits,
    /// `total / base`, 1.0 when base is zero
    pub multiplier: f64,
    pub total_tokens: Credits,
    pub price_cents: f64,
    pub segment_count: usize,
    pub total_duration_sec: TimeSec,
}

impl CostBreakdown {
    /// Cost of enabled segments with the given durations, in run order.
    ///
    /// Each segment is rounded up on its own, matching what a run charges.
    pub fn calculate(durations: &[TimeSec], features: FeatureSet) -> Self {
        let segment_count = durations.len();
        let total_duration: TimeSec = durations.iter().filter(|d| d.is_finite()).sum();
        let base_tokens = durations
            .iter()
            .map(|d| credits_for_seconds(*d))
            .sum::<Credits>();
        let surcharge_tokens = (0..segment_count)
            .map(|i| features.surcharge_for_segment(i == 0))
            .sum::<Credits>();
        let total_tokens = base_tokens + surcharge_tokens;
        let multiplier = if base_tokens == 0 {
            1.0
        } else {
            total_tokens as f64 / base_tokens as f64
        };

        Self {
            base_tokens,
            surcharge_tokens,
            multiplier,
            total_tokens,
            price_cents: price_for_credits(total_tokens),
            segment_count,
            total_duration_sec: total_duration.max(0.0),
        }
    }

    /// Cost of a collection's enabled segments
    pub fn for_collection(collection: &SegmentCollection, features: FeatureSet) -> Self {
        let durations: Vec<TimeSec> = collection.enabled_segments().map(|s| s.duration).collect();
        Self::calculate(&durations, features)
    }

    /// Price formatted as dollars
    pub fn price_display(&self) -> String {
        format!("${:.2}", self.price_cents / 100.0)
    }
}

/// Credits charged for one segment
pub fn credits_for_segment(duration: TimeSec, features: FeatureSet, is_first: bool) -> Credits {
    credits_for_seconds(duration) + features.surcharge_for_segment(is_first)
}

// =============================================================================
// Gate
// =============================================================================

/// Affordability check against a balance
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditGate {
    pub balance: Credits,
    /// Development override: always affordable, cost still computed
    pub unlimited: bool,
}

impl CreditGate {
    pub fn new(balance: Credits) -> Self {
        Self {
            balance,
            unlimited: false,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            balance: 0,
            unlimited: true,
        }
    }

    pub fn can_afford(&self, total_tokens: Credits) -> bool {
        self.unlimited || total_tokens <= self.balance
    }

    /// Fails with `InsufficientCredits` unless the breakdown is affordable
    pub fn check(&self, breakdown: &CostBreakdown) -> CoreResult<()> {
        if self.can_afford(breakdown.total_tokens) {
            if self.unlimited {
                debug!(
                    "Unlimited credits: allowing run costing {} credits",
                    breakdown.total_tokens
                );
            }
            return Ok(());
        }
        warn!(
            "Insufficient credits: {} required, {} available",
            breakdown.total_tokens, self.balance
        );
        Err(CoreError::InsufficientCredits {
            required: breakdown.total_tokens,
            available: self.balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segments::Segment;

    #[test]
    fn test_credits_for_seconds() {
        assert_eq!(credits_for_seconds(0.0), 0);
        assert_eq!(credits_for_seconds(-3.0), 0);
        assert_eq!(credits_for_seconds(f64::NAN), 0);
        assert_eq!(credits_for_seconds(5.0), 50);
        assert_eq!(credits_for_seconds(0.01), 1);
        assert_eq!(credits_for_seconds(4.55), 46);
    }

    #[test]
    fn test_rates_are_monotonic() {
        let mut last_credits = 0;
        let mut last_price = 0.0;
        for step in 0..400 {
            let d = step as f64 * 0.137;
            let credits = credits_for_seconds(d);
            let price = price_for_seconds(d);
            assert!(credits >= last_credits);
            assert!(price >= last_price);
            last_credits = credits;
            last_price = price;
        }
    }

    #[test]
    fn test_price_is_linear() {
        assert!((price_for_seconds(10.0) - 50.0).abs() < 1e-9);
        assert!((price_for_seconds(20.0) - 2.0 * price_for_seconds(10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_surcharges_apply_per_segment() {
        let features = FeatureSet::all();
        assert_eq!(features.surcharge_for_segment(true), 50);
        assert_eq!(features.surcharge_for_segment(false), 60);

        let breakdown = CostBreakdown::calculate(&[5.0, 5.0, 5.0], features);
        assert_eq!(breakdown.base_tokens, 150);
        assert_eq!(breakdown.surcharge_tokens, 50 + 60 + 60);
        assert_eq!(breakdown.total_tokens, 320);
        assert!((breakdown.multiplier - 320.0 / 150.0).abs() < 1e-9);
        assert!((breakdown.price_cents - 160.0).abs() < 1e-9);
        assert_eq!(breakdown.price_display(), "$1.60");
    }

    #[test]
    fn test_no_features_multiplier_is_one() {
        let breakdown = CostBreakdown::calculate(&[6.0, 6.0], FeatureSet::none());
        assert_eq!(breakdown.total_tokens, 120);
        assert!((breakdown.multiplier - 1.0).abs() < 1e-9);

        let empty = CostBreakdown::calculate(&[], FeatureSet::all());
        assert_eq!(empty.total_tokens, 0);
        assert!((empty.multiplier - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disabling_segment_removes_its_cost() {
        let segments = vec![
            Segment::new("a", 5.0).with_id("a"),
            Segment::new("b", 4.0).with_id("b"),
            Segment::new("c", 6.0).with_id("c"),
        ];
        let mut collection = SegmentCollection::from_segments(segments).unwrap();
        let features = FeatureSet {
            enhancement: true,
            ..FeatureSet::none()
        };

        let before = CostBreakdown::for_collection(&collection, features);
        collection.set_enabled("b", false).unwrap();
        let after = CostBreakdown::for_collection(&collection, features);

        assert_eq!(before.total_tokens - after.total_tokens, 40 + ENHANCEMENT_SURCHARGE);
        assert_eq!(after.segment_count, 2);
    }

    #[test]
    fn test_credit_gate() {
        let breakdown = CostBreakdown::calculate(&[10.0], FeatureSet::none());

        assert!(CreditGate::new(100).check(&breakdown).is_ok());
        match CreditGate::new(99).check(&breakdown) {
            Err(CoreError::InsufficientCredits {
                required,
                available,
            }) => {
                assert_eq!(required, 100);
                assert_eq!(available, 99);
            }
            other => panic!("unexpected {:?}", other),
        }

        let gate = CreditGate::unlimited();
        assert!(gate.can_afford(u64::MAX));
        assert!(gate.check(&breakdown).is_ok());
    }

    #[test]
    fn test_base_rounds_up_per_segment() {
        // 0.45s as one sum would be 5 credits; three runs of 0.15s charge 2 each
        let breakdown = CostBreakdown::calculate(&[0.15, 0.15, 0.15], FeatureSet::none());
        assert_eq!(breakdown.base_tokens, 6);
        assert!((breakdown.total_duration_sec - 0.45).abs() < 1e-9);

        let charged: Credits = [0.15, 0.15, 0.15]
            .iter()
            .enumerate()
            .map(|(i, d)| credits_for_segment(*d, FeatureSet::all(), i == 0))
            .sum();
        let breakdown = CostBreakdown::calculate(&[0.15, 0.15, 0.15], FeatureSet::all());
        assert_eq!(breakdown.total_tokens, charged);
    }

    #[test]
    fn test_segment_credits() {
        let features = FeatureSet::all();
        assert_eq!(credits_for_segment(5.0, features, true), 100);
        assert_eq!(credits_for_segment(5.0, features, false), 110);
    }
}
