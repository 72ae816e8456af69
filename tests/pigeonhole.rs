// Property test for the core-window sizing: whenever the computed core
// length comes from the substitution budget (not the configured floor), any
// placement of at most MaxSubs substitutions leaves at least one core window
// untouched, so the exact seed lookup cannot be blinded by mismatches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lodemap::defaults::MIN_CORE_LEN;
use lodemap::opts::AlignOpt;

/// Windows tiling the read at stride `core_len`.
fn windows(len: usize, core_len: usize) -> Vec<(usize, usize)> {
    (0..len / core_len)
        .map(|i| (i * core_len, (i + 1) * core_len))
        .collect()
}

fn clean_window_exists(len: usize, core_len: usize, subs: &[usize]) -> bool {
    windows(len, core_len)
        .iter()
        .any(|&(s, e)| !subs.iter().any(|&p| p >= s && p < e))
}

#[test]
fn test_pigeonhole_random_placements() {
    let mut rng = StdRng::seed_from_u64(4242);

    let mut cases = 0;
    while cases < 500 {
        let len = rng.gen_range(60..=400);
        let pct = rng.gen_range(1..=20);
        let min_edit_dist = rng.gen_range(1..=3u16);
        let opt = AlignOpt {
            max_subs_pct: pct,
            min_edit_dist,
            ..AlignOpt::default()
        };
        let max_subs = opt.max_subs_for(len) as usize;
        let core_len = opt.core_len_for(len);

        // The guarantee holds in the budget-derived regime; the configured
        // floor deliberately trades it away for very short reads.
        let divisor = if min_edit_dist <= 1 {
            max_subs + 1
        } else {
            max_subs + 2
        };
        if len / divisor < MIN_CORE_LEN {
            continue;
        }
        cases += 1;

        // random placement, at most max_subs distinct positions
        let mut subs: Vec<usize> = (0..max_subs).map(|_| rng.gen_range(0..len)).collect();
        subs.sort_unstable();
        subs.dedup();
        assert!(
            clean_window_exists(len, core_len, &subs),
            "len={} pct={} med={} core={} subs={:?}",
            len,
            pct,
            min_edit_dist,
            core_len,
            subs
        );
    }
}

#[test]
fn test_pigeonhole_adversarial_spacing() {
    // One substitution per window, front loaded: the strongest placement a
    // bounded adversary has. The window count always exceeds the budget, so
    // at least one window survives.
    for len in [88, 100, 150, 200, 300, 400] {
        for pct in [5u32, 10, 15, 20] {
            for min_edit_dist in [1u16, 2] {
                let opt = AlignOpt {
                    max_subs_pct: pct,
                    min_edit_dist,
                    ..AlignOpt::default()
                };
                let max_subs = opt.max_subs_for(len) as usize;
                let core_len = opt.core_len_for(len);
                let divisor = if min_edit_dist <= 1 {
                    max_subs + 1
                } else {
                    max_subs + 2
                };
                if len / divisor < MIN_CORE_LEN {
                    continue;
                }

                // hit the first max_subs windows once each
                let subs: Vec<usize> = (0..max_subs).map(|i| i * core_len).collect();
                assert!(subs.len() <= max_subs);
                assert!(
                    clean_window_exists(len, core_len, &subs),
                    "len={} pct={} med={} core={}",
                    len,
                    pct,
                    min_edit_dist,
                    core_len
                );

                // window count strictly exceeds the budget
                assert!(len / core_len >= max_subs + 1);
            }
        }
    }
}

#[test]
fn test_hundred_bp_ten_percent_case() {
    // 100 bp, 10 per 100 bp, MinEditDist 1: core 100/(10+1) = 9, and a
    // substitution placement at 10 and 60 leaves window 0 clean.
    let opt = AlignOpt {
        max_subs_pct: 10,
        min_edit_dist: 1,
        ..AlignOpt::default()
    };
    assert_eq!(opt.core_len_for(100), 9);
    assert!(clean_window_exists(100, 9, &[10, 60]));
}
