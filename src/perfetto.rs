//! Chrome trace JSON output.
//!
//! Records follow the Chrome Trace Event format: instant events (`ph:"i"`),
//! complete events (`ph:"X"`), and metadata records (`ph:"M"`) naming the
//! synthetic processes and threads the viewer groups events under. Each
//! category gets its own track (a "process" in viewer terms), and duration
//! categories get one sub-track ("thread") per CPU.

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use serde::Serialize;

/// First track id handed out. Category tracks are synthetic processes, so
/// the base keeps them clear of real pids showing up in instant events.
pub const TRACK_ID_BASE: u64 = 1000;

/// Hands out one stable integer track id per category name.
///
/// Ids grow monotonically from the base and are never reclaimed; the id
/// space is large enough for a single conversion run. The allocator is owned
/// by the writer and lives exactly as long as one run.
#[derive(Debug)]
pub struct TrackIdAllocator {
    map: HashMap<String, u64>,
    next_id: u64,
}

impl TrackIdAllocator {
    pub fn new(base: u64) -> Self {
        TrackIdAllocator {
            map: HashMap::new(),
            next_id: base,
        }
    }

    /// Returns `(assigned, id)`. `assigned` is true only on the first call
    /// for `name`; callers use it to gate one-time metadata emission.
    pub fn get(&mut self, name: &str) -> (bool, u64) {
        if let Some(&id) = self.map.get(name) {
            return (false, id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.map.insert(name.to_string(), id);
        (true, id)
    }
}

/// Event phase tag, determining the record shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Phase {
    /// Instant event with no duration.
    #[serde(rename = "i")]
    Instant,
    /// Complete event carrying both a start timestamp and a duration.
    #[serde(rename = "X")]
    Complete,
    /// Metadata record (process/thread names, sort indices).
    #[serde(rename = "M")]
    Metadata,
}

/// Scope of an instant event, i.e. how tall the marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum InstantScope {
    #[serde(rename = "g")]
    Global,
    #[serde(rename = "p")]
    Process,
    #[serde(rename = "t")]
    Thread,
}

#[derive(Debug, Serialize)]
pub struct EventArgs {
    pub info: String,
}

#[derive(Debug, Serialize)]
pub struct NameArgs {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SortIndexArgs {
    pub sort_index: i64,
}

#[derive(Debug, Serialize)]
pub struct InstantEvent {
    pub name: String,
    pub ph: Phase,
    pub ts: u64,
    pub cat: String,
    pub pid: u64,
    pub tid: i64,
    pub s: InstantScope,
    pub args: EventArgs,
}

#[derive(Debug, Serialize)]
pub struct CompleteEvent {
    pub name: String,
    pub ph: Phase,
    pub ts: u64,
    pub dur: i64,
    pub cat: String,
    pub pid: u64,
    pub tid: i64,
    pub args: EventArgs,
}

#[derive(Debug, Serialize)]
pub struct ProcessNameEvent {
    pub name: &'static str,
    pub ph: Phase,
    pub pid: u64,
    pub args: NameArgs,
}

#[derive(Debug, Serialize)]
pub struct ThreadNameEvent {
    pub name: &'static str,
    pub ph: Phase,
    pub pid: u64,
    pub tid: i64,
    pub args: NameArgs,
}

#[derive(Debug, Serialize)]
pub struct SortIndexEvent {
    pub name: &'static str,
    pub ph: Phase,
    pub pid: u64,
    pub args: SortIndexArgs,
}

/// One emitted trace record. Written immediately, never buffered for
/// reordering.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TraceRecord {
    Instant(InstantEvent),
    Complete(CompleteEvent),
    ProcessName(ProcessNameEvent),
    ThreadName(ThreadNameEvent),
    SortIndex(SortIndexEvent),
}

/// Serializes trace records into the output stream.
///
/// The stream is a single JSON object with a `traceEvents` array, one record
/// per line. Elements are comma-separated so the output is strictly valid
/// JSON and round-trips through any JSON parser.
pub struct TraceWriter<W: Write> {
    out: W,
    tracks: TrackIdAllocator,
    records_written: u64,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        TraceWriter {
            out,
            tracks: TrackIdAllocator::new(TRACK_ID_BASE),
            records_written: 0,
        }
    }

    /// Write the enclosing object and open the `traceEvents` array.
    pub fn start(&mut self) -> Result<()> {
        self.out.write_all(b"{\n\"traceEvents\":[\n")?;
        Ok(())
    }

    /// Close the array and the enclosing object, then flush.
    pub fn finish(&mut self) -> Result<()> {
        self.out.write_all(b"\n]\n}\n")?;
        self.out.flush()?;
        Ok(())
    }

    fn write_record(&mut self, record: &TraceRecord) -> Result<()> {
        if self.records_written > 0 {
            self.out.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut self.out, record)?;
        self.records_written += 1;
        Ok(())
    }

    /// Track id for a category, emitting its process-name record the first
    /// time the category is referenced.
    pub fn track_id(&mut self, cat: &str) -> Result<u64> {
        let (assigned, id) = self.tracks.get(cat);
        if assigned {
            self.write_record(&TraceRecord::ProcessName(ProcessNameEvent {
                name: "process_name",
                ph: Phase::Metadata,
                pid: id,
                args: NameArgs {
                    name: cat.to_string(),
                },
            }))?;
        }
        Ok(id)
    }

    pub fn add_instant_event(
        &mut self,
        name: &str,
        cat: &str,
        ts: u64,
        tid: i64,
        info: &str,
    ) -> Result<()> {
        let pid = self.track_id(cat)?;
        self.write_record(&TraceRecord::Instant(InstantEvent {
            name: name.to_string(),
            ph: Phase::Instant,
            ts,
            cat: cat.to_string(),
            pid,
            tid,
            s: InstantScope::Thread,
            args: EventArgs {
                info: info.to_string(),
            },
        }))
    }

    pub fn add_complete_event(
        &mut self,
        name: &str,
        cat: &str,
        ts: u64,
        dur: i64,
        tid: i64,
        info: &str,
    ) -> Result<()> {
        let pid = self.track_id(cat)?;
        self.write_record(&TraceRecord::Complete(CompleteEvent {
            name: name.to_string(),
            ph: Phase::Complete,
            ts,
            dur,
            cat: cat.to_string(),
            pid,
            tid,
            args: EventArgs {
                info: info.to_string(),
            },
        }))
    }

    pub fn add_thread_name(&mut self, name: &str, pid: u64, tid: i64) -> Result<()> {
        self.write_record(&TraceRecord::ThreadName(ThreadNameEvent {
            name: "thread_name",
            ph: Phase::Metadata,
            pid,
            tid,
            args: NameArgs {
                name: name.to_string(),
            },
        }))
    }

    pub fn add_process_sort_index(&mut self, pid: u64, sort_index: i64) -> Result<()> {
        self.write_record(&TraceRecord::SortIndex(SortIndexEvent {
            name: "process_sort_index",
            ph: Phase::Metadata,
            pid,
            args: SortIndexArgs { sort_index },
        }))
    }
}
