//! Admission: decides whether an annotation becomes an event.
//!
//! Gates are evaluated in a fixed order and any rejection short-circuits:
//! sampling, allow list, deny list, user predicate. The process-wide
//! `enabled` flag is checked by the emit path before this module is asked.

use std::cell::Cell;
use std::sync::Arc;

use crate::Filter;

/// Admission configuration; swapped whole on every mutation so readers
/// never lock.
#[derive(Clone)]
pub(crate) struct GateConfig {
    /// Category must appear here when present.
    pub(crate) allow: Option<Vec<String>>,
    /// Category must not appear here when present.
    pub(crate) deny: Option<Vec<String>>,
    /// Uniform keep probability; 1.0 skips the draw entirely.
    pub(crate) keep_probability: f64,
    pub(crate) filter: Option<Arc<dyn Filter>>,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            allow: None,
            deny: None,
            keep_probability: 1.0,
            filter: None,
        }
    }
}

/// Splits a category CSV into trimmed tokens; an empty input deactivates
/// the list. Empty tokens are kept so `"a,,b"` matches the empty category.
pub(crate) fn parse_csv(csv: &str) -> Option<Vec<String>> {
    if csv.is_empty() {
        return None;
    }
    Some(csv.split(',').map(|t| t.trim().to_string()).collect())
}

/// Gates 2-5 of the admission order; `enabled` is the caller's gate 1.
pub(crate) fn admit(cfg: &GateConfig, name: &str, cat: &str) -> bool {
    if !sample_keep(cfg.keep_probability) {
        return false;
    }
    if let Some(allow) = &cfg.allow {
        if !allow.iter().any(|t| t == cat) {
            return false;
        }
    }
    if let Some(deny) = &cfg.deny {
        if deny.iter().any(|t| t == cat) {
            return false;
        }
    }
    if let Some(filter) = &cfg.filter {
        if !filter.allow(name, cat) {
            return false;
        }
    }
    true
}

thread_local! {
    static SAMPLER: Cell<u64> = const { Cell::new(0) };
}

/// Draws from a thread-local xorshift64* stream seeded from thread id and
/// clock. `p >= 1` always keeps without drawing; `p <= 0` always rejects.
pub(crate) fn sample_keep(p: f64) -> bool {
    if p >= 1.0 {
        return true;
    }
    if p <= 0.0 {
        return false;
    }
    let u = SAMPLER.with(|state| {
        let mut x = state.get();
        if x == 0 {
            x = seed();
        }
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        state.set(x);
        let bits = x.wrapping_mul(0x2545F4914F6CDD1D);
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    });
    u <= p
}

fn seed() -> u64 {
    let raw = (crate::registry::current_tid() as u64) << 32 ^ crate::clock::now_us();
    // splitmix64 finalizer; never returns 0 for a 0 input either.
    let mut z = raw.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z = z ^ (z >> 31);
    if z == 0 {
        0x9E3779B97F4A7C15
    } else {
        z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", None)]
    #[case("a", Some(vec!["a"]))]
    #[case("a, b ,c", Some(vec!["a", "b", "c"]))]
    #[case("a,,b", Some(vec!["a", "", "b"]))]
    fn csv_tokens(#[case] input: &str, #[case] expected: Option<Vec<&str>>) {
        let expected = expected.map(|v| v.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert_eq!(parse_csv(input), expected);
    }

    #[test]
    fn allow_list_requires_membership() {
        let cfg = GateConfig {
            allow: parse_csv("important,frame"),
            ..GateConfig::default()
        };
        assert!(admit(&cfg, "e", "important"));
        assert!(!admit(&cfg, "e", "debug"));
        assert!(!admit(&cfg, "e", ""));
    }

    #[test]
    fn deny_list_rejects_membership() {
        let cfg = GateConfig {
            deny: parse_csv("debug"),
            ..GateConfig::default()
        };
        assert!(admit(&cfg, "e", "io"));
        assert!(!admit(&cfg, "e", "debug"));
    }

    #[test]
    fn empty_token_matches_empty_category() {
        let cfg = GateConfig {
            allow: parse_csv("a,,b"),
            ..GateConfig::default()
        };
        assert!(admit(&cfg, "e", ""));
    }

    #[test]
    fn deny_wins_after_allow() {
        let cfg = GateConfig {
            allow: parse_csv("io"),
            deny: parse_csv("io"),
            ..GateConfig::default()
        };
        assert!(!admit(&cfg, "e", "io"));
    }

    #[test]
    fn predicate_is_last() {
        let cfg = GateConfig {
            filter: Some(Arc::new(|name: &str, _cat: &str| name.contains("snap"))),
            ..GateConfig::default()
        };
        assert!(admit(&cfg, "snapshot", ""));
        assert!(!admit(&cfg, "heartbeat", ""));
    }

    #[test]
    fn sampling_extremes() {
        assert!(sample_keep(1.0));
        assert!(!sample_keep(0.0));
    }

    #[test]
    fn sampling_rate_is_roughly_honored() {
        let kept = (0..10_000).filter(|_| sample_keep(0.3)).count();
        assert!(kept > 2_000 && kept < 4_000, "kept {kept} of 10000");
    }
}
