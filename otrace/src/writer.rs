//! Serialization of a snapshot into the trace document.
//!
//! Collected events convert into `trace-format` typed events and the whole
//! document goes out through serde_json in one pass. Integral argument
//! values are written as JSON integers so `2` stays `2`.

use std::io::Write;

use serde_json::{Map, Number, Value};
use trace_format::{
    ChromeTrace, CompleteEvent, CounterEvent, DurationEvent, FlowEvent, InstantEvent,
    InstantScope, MetadataEvent, MetadataName, Phase as JsonPhase, TraceEvent,
};

use crate::collect::CleanEvent;
use crate::event::{ArgKind, Phase};

pub(crate) fn write_document<W: Write>(mut writer: W, events: &[CleanEvent]) -> crate::Result<()> {
    let document = ChromeTrace::new(events.iter().map(to_trace_event).collect());
    serde_json::to_writer(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.is_finite() && value.abs() <= i64::MAX as f64 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::Number(Number::from(0)))
    }
}

fn args_value(event: &CleanEvent) -> Option<Value> {
    if event.argc == 0 {
        return None;
    }
    let mut map = Map::new();
    for arg in event.args() {
        let value = match arg.kind {
            ArgKind::Number => json_number(arg.num),
            ArgKind::Str => Value::String(arg.text.as_str().to_string()),
            ArgKind::None => Value::Null,
        };
        map.insert(arg.key.as_str().to_string(), value);
    }
    Some(Value::Object(map))
}

fn color(event: &CleanEvent) -> Option<String> {
    if event.cname.is_empty() {
        None
    } else {
        Some(event.cname.as_str().to_string())
    }
}

fn to_trace_event(event: &CleanEvent) -> TraceEvent {
    let name = event.name().to_string();
    let cat = event.cat().to_string();
    match event.ph {
        Phase::Begin | Phase::End => TraceEvent::Duration(DurationEvent {
            name,
            cat,
            ph: if event.ph == Phase::Begin {
                JsonPhase::Begin
            } else {
                JsonPhase::End
            },
            ts: event.ts_us,
            pid: event.pid,
            tid: event.tid,
            cname: color(event),
            args: args_value(event),
        }),
        Phase::Complete => TraceEvent::Complete(CompleteEvent {
            name,
            cat,
            ph: JsonPhase::Complete,
            ts: event.ts_us,
            dur: event.dur_us,
            pid: event.pid,
            tid: event.tid,
            cname: color(event),
            args: args_value(event),
        }),
        Phase::Instant => TraceEvent::Instant(InstantEvent {
            name,
            cat,
            ph: JsonPhase::Instant,
            ts: event.ts_us,
            pid: event.pid,
            tid: event.tid,
            s: InstantScope::Thread,
            cname: color(event),
            args: args_value(event),
        }),
        Phase::Counter => TraceEvent::Counter(CounterEvent {
            name: name.clone(),
            cat,
            ph: JsonPhase::Counter,
            ts: event.ts_us,
            pid: event.pid,
            tid: event.tid,
            // A counter always carries at least one numeric series.
            args: args_value(event).unwrap_or_else(|| {
                let mut map = Map::new();
                map.insert(name, Value::Number(Number::from(0)));
                Value::Object(map)
            }),
            cname: color(event),
        }),
        Phase::FlowStart | Phase::FlowStep | Phase::FlowEnd => TraceEvent::Flow(FlowEvent {
            name,
            cat,
            ph: match event.ph {
                Phase::FlowStart => JsonPhase::FlowStart,
                Phase::FlowStep => JsonPhase::FlowStep,
                _ => JsonPhase::FlowEnd,
            },
            ts: event.ts_us,
            pid: event.pid,
            tid: event.tid,
            id: event.flow_id,
            cname: color(event),
            args: args_value(event),
        }),
        Phase::ThreadName | Phase::ProcessName => TraceEvent::Metadata(MetadataEvent {
            name: if event.ph == Phase::ThreadName {
                MetadataName::ThreadName
            } else {
                MetadataName::ProcessName
            },
            ph: JsonPhase::Metadata,
            ts: event.ts_us,
            pid: event.pid,
            tid: event.tid,
            args: {
                let mut map = Map::new();
                map.insert("name".to_string(), Value::String(name));
                Value::Object(map)
            },
        }),
        Phase::ThreadSortIndex => TraceEvent::Metadata(MetadataEvent {
            name: MetadataName::ThreadSortIndex,
            ph: JsonPhase::Metadata,
            ts: event.ts_us,
            pid: event.pid,
            tid: event.tid,
            args: {
                let sort_index = event.first_number().unwrap_or(0.0);
                let mut map = Map::new();
                map.insert("sort_index".to_string(), json_number(sort_index));
                Value::Object(map)
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn serialize(events: &[CleanEvent]) -> Value {
        let mut buffer = Vec::new();
        write_document(&mut buffer, events).expect("write");
        serde_json::from_slice(&buffer).expect("parse")
    }

    #[test]
    fn document_shape() {
        let doc = serialize(&[]);
        assert_eq!(doc.as_object().unwrap().len(), 2);
        assert_eq!(doc["displayTimeUnit"], "ms");
        assert_eq!(doc["traceEvents"], json!([]));
    }

    #[test]
    fn complete_event_fields() {
        let mut event = CleanEvent::synthetic(Phase::Complete, "s", "", 100, 7);
        event.tid = 3;
        event.dur_us = 2000;
        let doc = serialize(&[event]);
        let e = &doc["traceEvents"][0];
        assert_eq!(e["ph"], "X");
        assert_eq!(e["name"], "s");
        assert_eq!(e["cat"], "");
        assert_eq!(e["dur"], 2000);
        assert_eq!(e["pid"], 7);
        assert_eq!(e["tid"], 3);
        assert!(e.get("cname").is_none());
    }

    #[test]
    fn instant_scope_and_arg_order() {
        let mut event = CleanEvent::synthetic(Phase::Instant, "tick", "frame", 5, 1);
        event.push_number("phase", 2.0);
        let mut arg = crate::event::Arg::default();
        arg.key.set("stage");
        arg.kind = ArgKind::Str;
        arg.text.set("copy");
        event.args[1] = arg;
        event.argc = 2;
        event.push_number("ok", 1.0);
        let doc = serialize(&[event]);
        let e = &doc["traceEvents"][0];
        assert_eq!(e["s"], "t");
        assert_eq!(e["args"]["phase"], json!(2));
        assert_eq!(e["args"]["stage"], "copy");
        let keys: Vec<_> = e["args"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["phase", "stage", "ok"]);
    }

    #[test]
    fn flow_carries_id() {
        let mut event = CleanEvent::synthetic(Phase::FlowStart, "flow", "flow", 1, 1);
        event.flow_id = 42;
        let doc = serialize(&[event]);
        let e = &doc["traceEvents"][0];
        assert_eq!(e["ph"], "s");
        assert_eq!(e["id"], 42);
    }

    #[test]
    fn metadata_literals() {
        let thread = {
            let mut e = CleanEvent::synthetic(Phase::ThreadName, "worker-0", "", 0, 1);
            e.tid = 5;
            e
        };
        let sort = {
            let mut e = CleanEvent::synthetic(Phase::ThreadSortIndex, "", "", 0, 1);
            e.tid = 5;
            e.push_number("sort_index", 10.0);
            e
        };
        let process = CleanEvent::synthetic(Phase::ProcessName, "my-app", "", 0, 1);
        let doc = serialize(&[thread, sort, process]);
        let events = doc["traceEvents"].as_array().unwrap();
        assert_eq!(events[0]["name"], "thread_name");
        assert_eq!(events[0]["ph"], "M");
        assert_eq!(events[0]["args"]["name"], "worker-0");
        assert_eq!(events[1]["name"], "thread_sort_index");
        assert_eq!(events[1]["args"]["sort_index"], json!(10));
        assert_eq!(events[2]["name"], "process_name");
        assert_eq!(events[2]["args"]["name"], "my-app");
    }

    #[test]
    fn color_hint_is_written_when_present() {
        let mut event = CleanEvent::synthetic(Phase::Instant, "x", "", 1, 1);
        event.cname.set("good");
        let doc = serialize(&[event]);
        assert_eq!(doc["traceEvents"][0]["cname"], "good");
    }

    #[test]
    fn fractional_numbers_stay_fractional() {
        let mut event = CleanEvent::synthetic(Phase::Counter, "c", "", 1, 1);
        event.push_number("v", 2.5);
        let doc = serialize(&[event]);
        assert_eq!(doc["traceEvents"][0]["args"]["v"], json!(2.5));
    }

    #[test]
    fn escaped_strings_roundtrip() {
        let mut event = CleanEvent::synthetic(Phase::Instant, "quote\"and\\slash", "", 1, 1);
        let mut arg = crate::event::Arg::default();
        arg.key.set("text");
        arg.kind = ArgKind::Str;
        arg.text.set("line\nbreak\ttab");
        event.args[0] = arg;
        event.argc = 1;
        let doc = serialize(&[event]);
        let e = &doc["traceEvents"][0];
        assert_eq!(e["name"], "quote\"and\\slash");
        assert_eq!(e["args"]["text"], "line\nbreak\ttab");
    }
}
