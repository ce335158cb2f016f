use drop_drift::{simulate, WindProfile, WindSample};
use proptest::prelude::*;

fn sample() -> impl Strategy<Value = WindSample> {
    (0.0..12_000.0f64, 0.0..360.0f64, 0.0..60.0f64)
        .prop_map(|(alt, dir, spd)| WindSample::new(alt, dir, spd))
}

fn profile(min: usize) -> impl Strategy<Value = WindProfile> {
    prop::collection::vec(sample(), min..40).prop_map(WindProfile::new)
}

proptest! {
    #[test]
    fn distance_is_non_negative(p in profile(0), release in 0.0..12_000.0f64, target in 0.0..12_000.0f64) {
        let result = simulate(&p, release, target, 10.7).unwrap();
        prop_assert!(result.distance_m >= 0.0);
    }

    #[test]
    fn heading_stays_in_compass_range(p in profile(0), release in 0.0..12_000.0f64, target in 0.0..12_000.0f64) {
        let result = simulate(&p, release, target, 10.7).unwrap();
        prop_assert!(result.heading_deg >= 0.0 && result.heading_deg < 360.0, "heading {}", result.heading_deg);
    }

    #[test]
    fn repeated_runs_are_bit_identical(p in profile(2), rate in 1.0..30.0f64) {
        let a = simulate(&p, 12_000.0, 0.0, rate).unwrap();
        let b = simulate(&p, 12_000.0, 0.0, rate).unwrap();
        prop_assert_eq!(a.easting_m.to_bits(), b.easting_m.to_bits());
        prop_assert_eq!(a.northing_m.to_bits(), b.northing_m.to_bits());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn at_most_one_sample_in_window_is_degenerate(s in sample(), release in 0.0..12_000.0f64) {
        let p = WindProfile::new(vec![s]);
        let result = simulate(&p, release, 0.0, 10.7).unwrap();
        prop_assert!(result.is_degenerate());
        prop_assert_eq!(result.distance_m, 0.0);
        prop_assert_eq!((result.easting_m, result.northing_m), (0.0, 0.0));
    }

    #[test]
    fn constant_east_wind_drifts_east(
        mut alts in prop::collection::vec(0.0..10_000.0f64, 2..20),
        speed in 0.5..40.0f64,
    ) {
        alts.sort_by(|a, b| b.partial_cmp(a).unwrap());
        alts.dedup();
        prop_assume!(alts.len() >= 2);
        let p: WindProfile = alts.iter().map(|&a| WindSample::new(a, 90.0, speed)).collect();
        let result = simulate(&p, alts[0], alts[alts.len() - 1], 10.7).unwrap();
        prop_assert!(result.easting_m > 0.0);
        prop_assert!(result.northing_m.abs() < 1e-9 * result.distance_m.max(1.0));
        prop_assert!((result.heading_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn constant_north_wind_drifts_north(
        mut alts in prop::collection::vec(0.0..10_000.0f64, 2..20),
        speed in 0.5..40.0f64,
    ) {
        alts.sort_by(|a, b| b.partial_cmp(a).unwrap());
        alts.dedup();
        prop_assume!(alts.len() >= 2);
        let p: WindProfile = alts.iter().map(|&a| WindSample::new(a, 0.0, speed)).collect();
        let result = simulate(&p, alts[0], alts[alts.len() - 1], 10.7).unwrap();
        prop_assert!(result.northing_m > 0.0);
        prop_assert_eq!(result.easting_m, 0.0);
        prop_assert_eq!(result.heading_deg, 0.0);
    }

    #[test]
    fn faster_descent_drifts_less(
        mut alts in prop::collection::vec(0.0..10_000.0f64, 2..20),
        dir in 0.0..360.0f64,
        speed in 0.5..40.0f64,
        rate in 1.0..20.0f64,
    ) {
        alts.sort_by(|a, b| b.partial_cmp(a).unwrap());
        alts.dedup();
        prop_assume!(alts.len() >= 2);
        let p: WindProfile = alts.iter().map(|&a| WindSample::new(a, dir, speed)).collect();
        let (top, bottom) = (alts[0], alts[alts.len() - 1]);
        let slow = simulate(&p, top, bottom, rate).unwrap();
        let fast = simulate(&p, top, bottom, rate * 2.0).unwrap();
        prop_assert!(fast.distance_m < slow.distance_m);
    }

    #[test]
    fn negative_speed_is_rejected(p in profile(1), idx in any::<prop::sample::Index>(), speed in -100.0..-0.001f64) {
        let mut samples = p.samples().to_vec();
        let i = idx.index(samples.len());
        samples[i].speed_mps = speed;
        let err = simulate(&WindProfile::new(samples), 12_000.0, 0.0, 10.7).unwrap_err();
        prop_assert!(err.is_validation());
    }
}
