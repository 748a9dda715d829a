#![cfg(feature = "heap")]

//! Heap layer end-to-end: retained allocations must surface in the leak
//! report. Lives in its own binary because it installs the global
//! allocator for the whole process.

use eyre::Result;
use serde_json::Value;
use tempfile::TempDir;

#[global_allocator]
static ALLOC: otrace::TracingAllocator = otrace::TracingAllocator::system();

fn named<'a>(events: &'a [Value], name: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["name"] == name).collect()
}

#[test]
fn leak_report_attributes_retained_allocations() -> Result<()> {
    let dir = TempDir::new()?;
    otrace::enable();
    otrace::set_sampling(1.0);

    otrace::heap_set_sampling(1.0);
    otrace::heap_enable(true);

    let mut retained: Vec<Vec<u8>> = Vec::new();
    for _ in 0..100 {
        retained.push(vec![0u8; 8192]);
    }
    let small = vec![1u8; 1024];
    let medium = vec![2u8; 2048];

    // Quiet the hooks during reporting without disarming them.
    otrace::heap_set_sampling(0.0);
    otrace::heap_report();

    let path = dir.path().join("heap.json");
    otrace::flush(Some(&path));

    let text = std::fs::read_to_string(&path)?;
    let doc: Value = serde_json::from_str(&text)?;
    let events = doc["traceEvents"].as_array().cloned().unwrap_or_default();

    assert_eq!(named(&events, "heap_report_started").len(), 1);
    assert_eq!(named(&events, "heap_report_done").len(), 1);

    let leaks = named(&events, "heap_leaks");
    assert!(!leaks.is_empty(), "no heap_leaks entries");
    assert!(leaks.iter().all(|e| e["cat"] == "heap" && e["ph"] == "I"));
    let mentions_big_site = leaks.iter().any(|e| {
        e["args"]["site"]
            .as_str()
            .is_some_and(|site| site.contains("8192"))
    });
    assert!(mentions_big_site, "leaks: {leaks:?}");

    let live = named(&events, "heap_live_bytes");
    assert!(!live.is_empty(), "no heap_live_bytes counter");
    let reported = live
        .iter()
        .filter_map(|e| e["args"]["heap_live_bytes"].as_f64())
        .fold(0.0f64, f64::max);
    assert!(reported >= 100.0 * 8192.0, "live bytes {reported}");

    drop(retained);
    drop(small);
    drop(medium);
    otrace::heap_enable(false);
    Ok(())
}
