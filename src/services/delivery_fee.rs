use serde::{Deserialize, Serialize};

/// Tiered delivery pricing schedule. Deployment configuration, never a
/// hardcoded constant: two schedules are known to coexist in deployment
/// history and the fee math must not drift silently between them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Flat fee (minor units) covering distances up to the threshold,
    /// inclusive.
    pub base_fee: i64,
    pub base_distance_km: f64,
    /// Per whole extra kilometer beyond the threshold, rounded up.
    pub per_km_fee: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_fee: 400,
            base_distance_km: 2.0,
            per_km_fee: 200,
        }
    }
}

impl FeeSchedule {
    /// Computes the delivery fee for a non-negative distance in kilometers.
    /// Distance at or under the threshold pays the base fee; anything beyond
    /// bills per started kilometer (ceiling). Saturates instead of wrapping
    /// for distances far outside any deliverable range.
    pub fn fee(&self, distance_km: f64) -> i64 {
        if distance_km <= self.base_distance_km {
            return self.base_fee;
        }
        // The f64 -> i64 cast saturates, as does the arithmetic below.
        let extra_km = (distance_km - self.base_distance_km).ceil() as i64;
        self.base_fee
            .saturating_add(extra_km.saturating_mul(self.per_km_fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn schedule_a() -> FeeSchedule {
        FeeSchedule {
            base_fee: 400,
            base_distance_km: 2.0,
            per_km_fee: 200,
        }
    }

    fn schedule_b() -> FeeSchedule {
        FeeSchedule {
            base_fee: 600,
            base_distance_km: 3.0,
            per_km_fee: 100,
        }
    }

    #[test_case(0.0, 400 ; "zero distance pays base")]
    #[test_case(0.5, 400 ; "short hop pays base")]
    #[test_case(2.0, 400 ; "threshold is inclusive")]
    #[test_case(2.1, 600 ; "just past threshold bills one whole km")]
    #[test_case(3.0, 600 ; "exactly one extra km")]
    #[test_case(4.5, 1000 ; "fractional extra rounds up")]
    #[test_case(5.0, 1000 ; "five km on the 400 base schedule")]
    fn schedule_a_fees(distance: f64, expected: i64) {
        assert_eq!(schedule_a().fee(distance), expected);
    }

    #[test_case(3.0, 600)]
    #[test_case(3.2, 700)]
    #[test_case(5.0, 800)]
    #[test_case(10.0, 1300)]
    fn schedule_b_fees(distance: f64, expected: i64) {
        assert_eq!(schedule_b().fee(distance), expected);
    }

    #[test]
    fn absurd_distances_saturate_instead_of_panicking() {
        let schedule = schedule_a();
        assert_eq!(schedule.fee(1e18), i64::MAX);
        assert_eq!(schedule.fee(f64::MAX), i64::MAX);
    }

    proptest! {
        #[test]
        fn distances_within_threshold_pay_exactly_base(d in 0.0f64..=2.0) {
            prop_assert_eq!(schedule_a().fee(d), 400);
        }

        #[test]
        fn fee_never_decreases_with_distance(d1 in 0.0f64..50.0, d2 in 0.0f64..50.0) {
            let (near, far) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
            let schedule = schedule_a();
            prop_assert!(schedule.fee(near) <= schedule.fee(far));
        }
    }
}
