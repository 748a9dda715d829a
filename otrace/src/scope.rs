//! Scoped timing: a guard that emits a complete slice when released.
//!
//! The admission decision is taken once, at entry; a rejected guard is
//! inert and release never re-evaluates the gate. Release runs on every
//! exit path, including unwinds.

use crate::event::{BoundedStr, MAX_ARG_KEY, MAX_CAT, MAX_NAME};
use crate::registry::{registry, ReentrancyGuard};
use crate::{clock, emit, gate};

/// Emits a complete event covering its own lifetime when dropped.
#[must_use = "the slice ends when the guard is dropped"]
pub struct ScopeGuard {
    armed: Option<Armed>,
}

struct Armed {
    t0: u64,
    name: BoundedStr<MAX_NAME>,
    cat: BoundedStr<MAX_CAT>,
    arg: Option<(BoundedStr<MAX_ARG_KEY>, f64)>,
}

fn admitted(name: &str, cat: &str) -> bool {
    let Some(_guard) = ReentrancyGuard::enter() else {
        return false;
    };
    let reg = registry();
    reg.enabled() && gate::admit(&reg.gate.load(), name, cat)
}

fn enter(name: &str, cat: Option<&str>, arg: Option<(&str, f64)>) -> ScopeGuard {
    let cat = cat.unwrap_or("");
    if !admitted(name, cat) {
        return ScopeGuard { armed: None };
    }
    let mut armed = Armed {
        t0: clock::now_us(),
        name: BoundedStr::empty(),
        cat: BoundedStr::empty(),
        arg: None,
    };
    armed.name.set(name);
    armed.cat.set(cat);
    if let Some((key, value)) = arg {
        let mut bounded = BoundedStr::empty();
        bounded.set(key);
        armed.arg = Some((bounded, value));
    }
    ScopeGuard { armed: Some(armed) }
}

/// Starts a timed scope.
pub fn scope(name: &str, cat: Option<&str>) -> ScopeGuard {
    enter(name, cat, None)
}

/// Starts a timed scope carrying one numeric key/value pair.
pub fn scope_with(name: &str, cat: Option<&str>, key: &str, value: f64) -> ScopeGuard {
    enter(name, cat, Some((key, value)))
}

/// Starts a timed scope in the `"zone"` category.
pub fn zone(name: &str) -> ScopeGuard {
    scope(name, Some("zone"))
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            let dur = clock::now_us().saturating_sub(armed.t0);
            let arg = armed.arg.as_ref().map(|(k, v)| (k.as_str(), *v));
            emit::complete_pregated(armed.name.as_str(), armed.cat.as_str(), armed.t0, dur, arg);
        }
    }
}
