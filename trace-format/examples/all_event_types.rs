//! Writes a small trace exercising every event type this crate models.
//!
//! Load the output in https://ui.perfetto.dev or chrome://tracing.
//!
//! Usage: all_event_types <output_file>

use std::env;
use trace_format::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let output_file = if args.len() > 1 {
        &args[1]
    } else {
        eprintln!("Usage: {} <output_file>", args[0]);
        std::process::exit(1);
    };

    let mut events = vec![];

    events.push(TraceEvent::Metadata(
        MetadataEvent::builder()
            .name(MetadataName::ProcessName)
            .ph(Phase::Metadata)
            .ts(0)
            .pid(1234)
            .tid(0)
            .args(serde_json::json!({"name": "demo-app"}))
            .build(),
    ));
    events.push(TraceEvent::Metadata(
        MetadataEvent::builder()
            .name(MetadataName::ThreadName)
            .ph(Phase::Metadata)
            .ts(0)
            .pid(1234)
            .tid(5678)
            .args(serde_json::json!({"name": "main"}))
            .build(),
    ));
    events.push(TraceEvent::Metadata(
        MetadataEvent::builder()
            .name(MetadataName::ThreadSortIndex)
            .ph(Phase::Metadata)
            .ts(0)
            .pid(1234)
            .tid(5678)
            .args(serde_json::json!({"sort_index": -1}))
            .build(),
    ));

    events.push(TraceEvent::Duration(
        DurationEvent::builder()
            .name("request".to_string())
            .cat("app".to_string())
            .ph(Phase::Begin)
            .ts(1_000)
            .pid(1234)
            .tid(5678)
            .build(),
    ));
    events.push(TraceEvent::Complete(
        CompleteEvent::builder()
            .name("parse".to_string())
            .cat("app".to_string())
            .ph(Phase::Complete)
            .ts(1_200)
            .dur(600)
            .pid(1234)
            .tid(5678)
            .args(serde_json::json!({"bytes": 4096}))
            .build(),
    ));
    events.push(TraceEvent::Instant(
        InstantEvent::builder()
            .name("cache_hit".to_string())
            .cat("app".to_string())
            .ph(Phase::Instant)
            .ts(1_500)
            .pid(1234)
            .tid(5678)
            .s(InstantScope::Thread)
            .build(),
    ));
    events.push(TraceEvent::Duration(
        DurationEvent::builder()
            .name("request".to_string())
            .cat("app".to_string())
            .ph(Phase::End)
            .ts(2_400)
            .pid(1234)
            .tid(5678)
            .build(),
    ));

    for (ts, value) in [(1_000u64, 3), (1_800, 7), (2_600, 2)] {
        events.push(TraceEvent::Counter(
            CounterEvent::builder()
                .name("queue_len".to_string())
                .cat("app".to_string())
                .ph(Phase::Counter)
                .ts(ts)
                .pid(1234)
                .tid(5678)
                .args(serde_json::json!({"queue_len": value}))
                .build(),
        ));
    }

    for (ts, ph) in [
        (1_100u64, Phase::FlowStart),
        (1_700, Phase::FlowStep),
        (2_300, Phase::FlowEnd),
    ] {
        events.push(TraceEvent::Flow(
            FlowEvent::builder()
                .name("flow".to_string())
                .cat("flow".to_string())
                .ph(ph)
                .ts(ts)
                .pid(1234)
                .tid(5678)
                .id(42)
                .build(),
        ));
    }

    let trace = ChromeTrace::new(events);
    let json = serde_json::to_string_pretty(&trace)?;
    std::fs::write(output_file, json)?;
    println!("wrote {output_file}");
    Ok(())
}
