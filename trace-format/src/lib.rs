// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Trace Format
//!
//! Rust types for the Chrome Trace Event Format, the JSON representation
//! consumed by the Chrome Trace Viewer (chrome://tracing) and by Perfetto's
//! legacy JSON importer.
//!
//! Only the event kinds an in-process timeline tracer produces are modeled
//! here:
//!
//! - **Duration Events** (B/E): mark the beginning and end of operations
//! - **Complete Events** (X): begin/end combined into one event with duration
//! - **Instant Events** (I): points in time with no duration
//! - **Counter Events** (C): numeric series sampled over time
//! - **Flow Events** (s/t/f): arrows connecting events across threads
//! - **Metadata Events** (M): process/thread names and sort indices
//!
//! All timestamps are microseconds. The top-level [`ChromeTrace`] document
//! carries the event array plus a display unit and nothing else, so the
//! serialized form is stable across write/parse/write cycles.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The top-level trace document.
///
/// Serializes as an object with exactly two keys: `traceEvents` and
/// `displayTimeUnit`. Events do not need to be in timestamp order; the
/// viewer sorts them for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromeTrace {
    /// The array of trace events.
    #[serde(rename = "traceEvents")]
    pub trace_events: Vec<TraceEvent>,

    /// Unit for displaying timestamps, `"ms"` or `"ns"`.
    #[serde(rename = "displayTimeUnit")]
    pub display_time_unit: String,
}

impl ChromeTrace {
    /// Wraps an event array in a document displayed in milliseconds.
    pub fn new(trace_events: Vec<TraceEvent>) -> Self {
        ChromeTrace {
            trace_events,
            display_time_unit: "ms".to_string(),
        }
    }
}

/// A single trace event.
///
/// Serialization is untagged: each variant writes its own flat object.
/// Deserialization dispatches on the `ph` field, so a parsed event always
/// lands in the variant matching its phase rather than the first variant
/// whose required fields happen to be present.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TraceEvent {
    Duration(DurationEvent),
    Complete(CompleteEvent),
    Instant(InstantEvent),
    Counter(CounterEvent),
    Flow(FlowEvent),
    Metadata(MetadataEvent),
}

impl<'de> Deserialize<'de> for TraceEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let ph = value
            .get("ph")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("ph"))?
            .to_string();

        let event = match ph.as_str() {
            "B" | "E" => TraceEvent::Duration(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            "X" => TraceEvent::Complete(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            "I" | "i" => TraceEvent::Instant(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            "C" => TraceEvent::Counter(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            "s" | "t" | "f" => TraceEvent::Flow(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            "M" => TraceEvent::Metadata(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            ),
            other => {
                return Err(D::Error::custom(format!(
                    "unsupported event phase {other:?}"
                )))
            }
        };
        Ok(event)
    }
}

impl TraceEvent {
    /// The event's phase tag.
    pub fn phase(&self) -> Phase {
        match self {
            TraceEvent::Duration(e) => e.ph,
            TraceEvent::Complete(e) => e.ph,
            TraceEvent::Instant(e) => e.ph,
            TraceEvent::Counter(e) => e.ph,
            TraceEvent::Flow(e) => e.ph,
            TraceEvent::Metadata(e) => e.ph,
        }
    }

    /// Timestamp in microseconds.
    pub fn ts(&self) -> u64 {
        match self {
            TraceEvent::Duration(e) => e.ts,
            TraceEvent::Complete(e) => e.ts,
            TraceEvent::Instant(e) => e.ts,
            TraceEvent::Counter(e) => e.ts,
            TraceEvent::Flow(e) => e.ts,
            TraceEvent::Metadata(e) => e.ts,
        }
    }

    /// Thread id.
    pub fn tid(&self) -> u32 {
        match self {
            TraceEvent::Duration(e) => e.tid,
            TraceEvent::Complete(e) => e.tid,
            TraceEvent::Instant(e) => e.tid,
            TraceEvent::Counter(e) => e.tid,
            TraceEvent::Flow(e) => e.tid,
            TraceEvent::Metadata(e) => e.tid,
        }
    }
}

/// Event phase tags.
///
/// The phase determines how the viewer interprets the object and which
/// additional fields are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Begin half of a duration event; paired with a following `E`.
    #[serde(rename = "B")]
    Begin,
    /// End half of a duration event.
    #[serde(rename = "E")]
    End,
    /// Complete event carrying its own `dur`.
    #[serde(rename = "X")]
    Complete,
    /// Instant event, drawn as a vertical line.
    #[serde(rename = "I")]
    Instant,
    /// Counter sample, drawn as a line graph.
    #[serde(rename = "C")]
    Counter,
    /// Start of a flow arrow.
    #[serde(rename = "s")]
    FlowStart,
    /// Intermediate flow step.
    #[serde(rename = "t")]
    FlowStep,
    /// End of a flow arrow.
    #[serde(rename = "f")]
    FlowEnd,
    /// Metadata: process/thread names and sort indices.
    #[serde(rename = "M")]
    Metadata,
}

/// Visual height of an instant event in the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstantScope {
    /// Spans the entire timeline.
    #[serde(rename = "g")]
    Global,
    /// Spans all threads of the process.
    #[serde(rename = "p")]
    Process,
    /// Confined to one thread lane.
    #[serde(rename = "t")]
    Thread,
}

/// Begin or end of an operation on a thread.
///
/// B events must precede their matching E events and must nest properly
/// within a thread.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct DurationEvent {
    /// Display name in the trace viewer.
    pub name: String,
    /// Comma-separated categories used for filtering; may be empty.
    pub cat: String,
    /// Must be [`Phase::Begin`] or [`Phase::End`].
    pub ph: Phase,
    /// Timestamp in microseconds.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Thread id.
    pub tid: u32,
    /// Fixed color name from the viewer's reserved palette.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Arbitrary key/value payload shown in the event details pane.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// An operation with a known duration; half the size of a B/E pair.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct CompleteEvent {
    /// Display name in the trace viewer.
    pub name: String,
    /// Comma-separated categories used for filtering; may be empty.
    pub cat: String,
    /// Must be [`Phase::Complete`].
    pub ph: Phase,
    /// Start timestamp in microseconds.
    pub ts: u64,
    /// Duration in microseconds.
    pub dur: u64,
    /// Process id.
    pub pid: u32,
    /// Thread id.
    pub tid: u32,
    /// Fixed color name from the viewer's reserved palette.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Arbitrary key/value payload shown in the event details pane.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Something that happened at a point in time: a vblank, a log line, a
/// frame boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct InstantEvent {
    /// Display name in the trace viewer.
    pub name: String,
    /// Comma-separated categories used for filtering; may be empty.
    pub cat: String,
    /// Must be [`Phase::Instant`].
    pub ph: Phase,
    /// Timestamp in microseconds.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Thread id.
    pub tid: u32,
    /// Scope of the vertical marker.
    pub s: InstantScope,
    /// Fixed color name from the viewer's reserved palette.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Arbitrary key/value payload shown in the event details pane.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// One sample of one or more numeric series.
///
/// Each key of `args` is a series; multiple series stack in the viewer.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct CounterEvent {
    /// Display name of the counter track.
    pub name: String,
    /// Comma-separated categories used for filtering; may be empty.
    pub cat: String,
    /// Must be [`Phase::Counter`].
    pub ph: Phase,
    /// Timestamp in microseconds.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Thread id.
    pub tid: u32,
    /// Series values; at least one numeric entry.
    pub args: Value,
    /// Fixed color name from the viewer's reserved palette.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
}

/// One point of an id-linked flow; events sharing an id are connected with
/// arrows across threads.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct FlowEvent {
    /// Display name in the trace viewer.
    pub name: String,
    /// Comma-separated categories used for filtering; may be empty.
    pub cat: String,
    /// Must be [`Phase::FlowStart`], [`Phase::FlowStep`] or [`Phase::FlowEnd`].
    pub ph: Phase,
    /// Timestamp in microseconds.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Thread id.
    pub tid: u32,
    /// Flow id linking start, steps and end.
    pub id: u64,
    /// Fixed color name from the viewer's reserved palette.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Arbitrary key/value payload shown in the event details pane.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Fixed names of the metadata events the viewer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataName {
    /// Sets the display name of a thread; value under `args.name`.
    #[serde(rename = "thread_name")]
    ThreadName,
    /// Sets the display name of a process; value under `args.name`.
    #[serde(rename = "process_name")]
    ProcessName,
    /// Orders thread lanes; value under `args.sort_index`.
    #[serde(rename = "thread_sort_index")]
    ThreadSortIndex,
}

/// Process/thread naming and ordering hints.
///
/// The viewer treats repeated metadata idempotently, so emitting the same
/// name on every flush is harmless.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct MetadataEvent {
    /// Which metadata entry this is; serialized as the fixed literal name.
    pub name: MetadataName,
    /// Must be [`Phase::Metadata`].
    pub ph: Phase,
    /// Timestamp in microseconds; conventionally 0 so metadata sorts first.
    pub ts: u64,
    /// Process id.
    pub pid: u32,
    /// Thread id; 0 for process-level metadata.
    pub tid: u32,
    /// `{"name": …}` or `{"sort_index": …}` depending on [`MetadataName`].
    pub args: Value,
}
