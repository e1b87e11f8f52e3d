//! Property tests for the known-id short-circuit under feeds that
//! resurface already-known ids out of order.

use std::collections::HashSet;

use ingestion::scan_known_streak;
use proptest::prelude::*;

/// Straight-line model of the scan: walk the feed, count consecutive
/// known ids, stop at the threshold, keep everything unknown before
/// that point.
fn model_scan(feed: &[String], known: &HashSet<String>, threshold: usize) -> Vec<String> {
    let mut kept = Vec::new();
    let mut streak = 0;
    for id in feed {
        if known.contains(id) {
            streak += 1;
            if streak >= threshold {
                break;
            }
        } else {
            streak = 0;
            kept.push(id.clone());
        }
    }
    kept
}

/// A feed mixing known ids (k0..k9, possibly resurfacing out of order)
/// and fresh ids.
fn feed_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            (0usize..10).prop_map(|i| format!("k{i}")),
            (0usize..50).prop_map(|i| format!("fresh{i}")),
        ],
        0..40,
    )
}

proptest! {
    #[test]
    fn scan_agrees_with_model(feed in feed_strategy(), threshold in 1usize..6) {
        let known: HashSet<String> = (0..10).map(|i| format!("k{i}")).collect();
        let kept = scan_known_streak(feed.clone(), |s| Some(s.as_str()), &known, threshold);
        prop_assert_eq!(kept, model_scan(&feed, &known, threshold));
    }

    #[test]
    fn scan_never_keeps_known_ids(feed in feed_strategy(), threshold in 1usize..6) {
        let known: HashSet<String> = (0..10).map(|i| format!("k{i}")).collect();
        let kept = scan_known_streak(feed, |s| Some(s.as_str()), &known, threshold);
        prop_assert!(kept.iter().all(|id| !known.contains(id)));
    }

    #[test]
    fn unseen_posts_before_first_streak_are_never_dropped(
        feed in feed_strategy(),
        threshold in 1usize..6,
    ) {
        let known: HashSet<String> = (0..10).map(|i| format!("k{i}")).collect();

        // position of the first threshold-length run of known ids
        let mut stop = feed.len();
        let mut streak = 0;
        for (i, id) in feed.iter().enumerate() {
            if known.contains(id) {
                streak += 1;
                if streak >= threshold {
                    stop = i;
                    break;
                }
            } else {
                streak = 0;
            }
        }

        let kept = scan_known_streak(feed.clone(), |s| Some(s.as_str()), &known, threshold);
        for id in feed[..stop].iter().filter(|id| !known.contains(*id)) {
            prop_assert!(kept.contains(id), "dropped unseen post {id}");
        }
    }
}
