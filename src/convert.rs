//! The conversion pass: one ftrace plaintext stream in, one Chrome trace
//! JSON stream out.

use std::io::{BufRead, Write};

use anyhow::Result;

use crate::duration::DurationTracker;
use crate::events::{Classification, EventDecoders, DURATION_CATEGORIES};
use crate::ftrace::LineParser;
use crate::perfetto::TraceWriter;

/// Counters accumulated over one conversion run, surfaced so callers can
/// report data-quality conditions without them ever aborting the pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConvertStats {
    pub lines_read: u64,
    pub lines_matched: u64,
    pub instant_events: u64,
    pub complete_events: u64,
    pub malformed_events: u64,
    pub span_overwrites: u64,
    pub unmatched_closes: u64,
    pub dropped_pending: u64,
}

/// Convert an ftrace plaintext stream into Chrome trace JSON.
///
/// Fully sequential: records are written in line-encounter order, except the
/// per-CPU track-naming metadata, which needs the maximum CPU index and is
/// therefore deferred until the input is exhausted. Only I/O failures are
/// fatal; everything else degrades to a warning and a counter.
pub fn convert<R: BufRead, W: Write>(input: R, output: W) -> Result<ConvertStats> {
    let parser = LineParser::new();
    let decoders = EventDecoders::new();
    let mut tracker = DurationTracker::new();
    let mut writer = TraceWriter::new(output);
    let mut stats = ConvertStats::default();
    let mut cpu_max: u32 = 0;

    writer.start()?;

    for line in input.lines() {
        let line = line?;
        stats.lines_read += 1;

        let Some(parsed) = parser.parse(&line) else {
            continue;
        };
        stats.lines_matched += 1;
        cpu_max = cpu_max.max(parsed.cpu);

        let class = match decoders.classify(&parsed, &mut tracker) {
            Ok(class) => class,
            Err(e) => {
                eprintln!("Warning: skipping malformed {} event: {e}", parsed.event);
                stats.malformed_events += 1;
                Classification::Skip
            }
        };

        match class {
            Classification::Skip | Classification::Defer => {}
            Classification::Complete { cat, span, tid } => {
                writer.add_complete_event(
                    &span.label,
                    cat,
                    span.start_ts,
                    span.dur,
                    tid,
                    &parsed.info,
                )?;
                stats.complete_events += 1;
            }
            Classification::Instant { cat, tid } => {
                writer.add_instant_event(
                    &parsed.task_name,
                    &cat,
                    parsed.timestamp_us,
                    tid,
                    &parsed.info,
                )?;
                stats.instant_events += 1;
            }
        }
    }

    // Duration categories use the CPU index as tid; name those sub-tracks so
    // every CPU shows up as its own lane under the category track, and pin
    // the category tracks ahead of ad hoc instant tracks in the viewer.
    for (idx, cat) in DURATION_CATEGORIES.iter().enumerate() {
        let track = writer.track_id(cat)?;
        writer.add_process_sort_index(track, idx as i64)?;
        for cpu in 0..=cpu_max {
            writer.add_thread_name(&format!("CPU{cpu}"), track, cpu as i64)?;
        }
    }

    stats.span_overwrites = tracker.overwrites();
    stats.unmatched_closes = tracker.unmatched_closes();
    stats.dropped_pending = tracker.pending_count() as u64;
    if stats.dropped_pending > 0 {
        eprintln!(
            "Warning: dropping {} span(s) still pending at end of input",
            stats.dropped_pending
        );
    }

    writer.finish()?;
    Ok(stats)
}
