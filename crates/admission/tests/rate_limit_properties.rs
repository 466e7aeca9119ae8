use admission::{RateWindow, SenderRateLimiter};
use proptest::prelude::*;

proptest! {
    #[test]
    fn window_never_admits_more_than_its_ceiling(
        max in 1usize..8,
        window_ms in 1i64..500,
        gaps in proptest::collection::vec(0i64..120, 1..200),
    ) {
        let mut window = RateWindow::new(max, window_ms);
        let mut now = 0i64;
        let mut admitted: Vec<i64> = Vec::new();
        for gap in gaps {
            now += gap;
            if window.allow(now) {
                admitted.push(now);
            }
            let recent = admitted.iter().filter(|ts| now - **ts < window_ms).count();
            prop_assert!(recent <= max);
            prop_assert!(window.len() <= max);
        }
    }

    #[test]
    fn senders_are_limited_independently(
        max in 1usize..5,
        bursts in proptest::collection::vec(0u8..4, 1..100),
    ) {
        let mut limiter = SenderRateLimiter::new(max, 1_000);
        let mut admitted = [0usize; 4];
        for sender in bursts {
            if limiter.allow(&format!("VEH_{sender}"), 0) {
                admitted[usize::from(sender)] += 1;
            }
        }
        for count in admitted {
            prop_assert!(count <= max);
        }
        prop_assert_eq!(limiter.sweep(1_000), limiter_len_before_sweep(&admitted));
        prop_assert_eq!(limiter.tracked_senders(), 0);
    }
}

fn limiter_len_before_sweep(admitted: &[usize; 4]) -> usize {
    admitted.iter().filter(|count| **count > 0).count()
}
