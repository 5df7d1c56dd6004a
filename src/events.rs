//! Per-event-kind decoders and line classification.
//!
//! Each pairable event family derives a correlation key and a label from the
//! free-text info payload, registers start halves with the
//! [`DurationTracker`], and pairs end halves back into completed spans. The
//! result is a single tagged [`Classification`] consumed at one dispatch
//! point in the conversion loop.

use anyhow::{anyhow, Result};
use regex::Regex;

use crate::duration::{CompletedSpan, DurationTracker};
use crate::ftrace::FtraceLine;

/// Categories that carry duration information. Their records use the CPU
/// index as tid, so each CPU becomes its own sub-track and gets named in the
/// end-of-stream metadata pass.
pub const DURATION_CATEGORIES: [&str; 6] = [
    "sched_switch",
    "suspend_resume",
    "irq_handler",
    "softirq",
    "device_pm_callback",
    "block_rq",
];

/// What to do with one classified line.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Nothing to emit (grammar mismatch handled upstream, or a malformed
    /// recognized event skipped after a diagnostic).
    Skip,
    /// Start half registered with the tracker; nothing to emit yet.
    Defer,
    /// End half paired with its start; emit one complete record.
    Complete {
        cat: &'static str,
        span: CompletedSpan,
        tid: i64,
    },
    /// Point event, or an end half whose pairing failed.
    Instant { cat: String, tid: i64 },
}

/// Sub-patterns for the recognized event kinds, compiled once per run.
pub struct EventDecoders {
    sched_re: Regex,
    block_insert_re: Regex,
    block_complete_re: Regex,
    irq_entry_re: Regex,
    irq_exit_re: Regex,
    softirq_entry_re: Regex,
    softirq_exit_re: Regex,
}

impl EventDecoders {
    pub fn new() -> Self {
        // Same command-name class as the line grammar's task-name field.
        let comm = r"[-\w<>.:/() ]";
        EventDecoders {
            sched_re: Regex::new(&format!(
                r"prev_comm=({comm}+) prev_pid=(-?\d+) prev_prio=-?\d+ prev_state=([A-Za-z|+]+) ==> next_comm=({comm}+) next_pid=(-?\d+) next_prio=-?\d+"
            ))
            .unwrap(),
            block_insert_re: Regex::new(
                r"(\d+),(\d+) (\w+) (\d+) \((\w*)\) (\d+) \+ (\d+) \[([\w/:-]+)\]",
            )
            .unwrap(),
            block_complete_re: Regex::new(r"(\d+),(\d+) (\w+) \((\w*)\) (\d+) \+ (\d+) \[(\d+)\]")
                .unwrap(),
            irq_entry_re: Regex::new(r"irq=(\d+) name=([\w.]+)").unwrap(),
            irq_exit_re: Regex::new(r"irq=(\d+)").unwrap(),
            softirq_entry_re: Regex::new(r"vec=(\d+) \[action=([A-Z_]+)\]").unwrap(),
            softirq_exit_re: Regex::new(r"vec=(\d+)").unwrap(),
        }
    }

    /// Classify one parsed line, registering or pairing spans as a side
    /// effect. A recognized event kind whose info payload does not match its
    /// sub-pattern is an error; the caller reports it and skips the line.
    pub fn classify(
        &self,
        line: &FtraceLine,
        tracker: &mut DurationTracker,
    ) -> Result<Classification> {
        let cpu = line.cpu;
        let ts = line.timestamp_us;
        match line.event.as_str() {
            "sched_switch" => self.classify_sched_switch(line, tracker),
            "block_rq_insert" => {
                let caps = self
                    .block_insert_re
                    .captures(&line.info)
                    .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
                let key = format!(
                    "block_rq-{}_{}_{}_{}@{cpu}",
                    &caps[1], &caps[2], &caps[6], &caps[7]
                );
                tracker.open(&key, format!("Comm={}", &caps[8]), ts);
                Ok(Classification::Defer)
            }
            "block_rq_complete" => {
                let caps = self
                    .block_complete_re
                    .captures(&line.info)
                    .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
                let key = format!(
                    "block_rq-{}_{}_{}_{}@{cpu}",
                    &caps[1], &caps[2], &caps[5], &caps[6]
                );
                Ok(end_classification("block_rq", tracker.close(&key, ts), cpu))
            }
            "irq_handler_entry" => {
                let caps = self
                    .irq_entry_re
                    .captures(&line.info)
                    .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
                tracker.open(
                    &format!("irq_handler-{}@{cpu}", &caps[1]),
                    caps[2].to_string(),
                    ts,
                );
                Ok(Classification::Defer)
            }
            "irq_handler_exit" => {
                let caps = self
                    .irq_exit_re
                    .captures(&line.info)
                    .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
                let key = format!("irq_handler-{}@{cpu}", &caps[1]);
                Ok(end_classification(
                    "irq_handler",
                    tracker.close(&key, ts),
                    cpu,
                ))
            }
            "softirq_entry" => {
                let caps = self
                    .softirq_entry_re
                    .captures(&line.info)
                    .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
                tracker.open(
                    &format!("softirq-{}@{cpu}", &caps[1]),
                    caps[2].to_string(),
                    ts,
                );
                Ok(Classification::Defer)
            }
            "softirq_exit" => {
                let caps = self
                    .softirq_exit_re
                    .captures(&line.info)
                    .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
                let key = format!("softirq-{}@{cpu}", &caps[1]);
                Ok(end_classification("softirq", tracker.close(&key, ts), cpu))
            }
            // Everything else passes through as an instant event on its own
            // per-event-kind track, keyed by the originating pid.
            _ => Ok(Classification::Instant {
                cat: line.event.clone(),
                tid: line.pid,
            }),
        }
    }

    /// A sched_switch line carries both halves: it may open a span for the
    /// incoming task and close the span of the outgoing one. The idle
    /// (swapper) task never gets a running slice in either direction, and a
    /// close that finds no pending span emits nothing rather than falling
    /// back to an instant event.
    fn classify_sched_switch(
        &self,
        line: &FtraceLine,
        tracker: &mut DurationTracker,
    ) -> Result<Classification> {
        let caps = self
            .sched_re
            .captures(&line.info)
            .ok_or_else(|| anyhow!("unrecognized payload: {}", line.info))?;
        let (prev_comm, prev_pid) = (&caps[1], &caps[2]);
        let (next_comm, next_pid) = (&caps[4], &caps[5]);
        let cpu = line.cpu;
        let ts = line.timestamp_us;

        if !next_comm.contains("swapper") {
            tracker.open(
                &format!("sched-{next_pid}@{cpu}"),
                next_comm.to_string(),
                ts,
            );
        }

        if !prev_comm.contains("swapper") {
            if let Some(span) = tracker.close(&format!("sched-{prev_pid}@{cpu}"), ts) {
                return Ok(Classification::Complete {
                    cat: "sched_switch",
                    span,
                    tid: cpu as i64,
                });
            }
        }
        Ok(Classification::Defer)
    }
}

impl Default for EventDecoders {
    fn default() -> Self {
        Self::new()
    }
}

fn end_classification(
    cat: &'static str,
    closed: Option<CompletedSpan>,
    cpu: u32,
) -> Classification {
    match closed {
        Some(span) => Classification::Complete {
            cat,
            span,
            tid: cpu as i64,
        },
        None => Classification::Instant {
            cat: cat.to_string(),
            tid: cpu as i64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(cpu: u32, ts: u64, event: &str, info: &str) -> FtraceLine {
        FtraceLine {
            task_name: "test".to_string(),
            pid: 42,
            tgid: "(-------)".to_string(),
            cpu,
            cpu_state: "d..2.".to_string(),
            timestamp_us: ts,
            event: event.to_string(),
            info: info.to_string(),
        }
    }

    #[test]
    fn test_irq_entry_exit_pair() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        let entry = line(0, 1_000_000, "irq_handler_entry", "irq=42 name=eth0");
        assert_eq!(
            decoders.classify(&entry, &mut tracker).unwrap(),
            Classification::Defer
        );

        let exit = line(0, 1_000_500, "irq_handler_exit", "irq=42 ret=handled");
        match decoders.classify(&exit, &mut tracker).unwrap() {
            Classification::Complete { cat, span, tid } => {
                assert_eq!(cat, "irq_handler");
                assert_eq!(span.label, "eth0");
                assert_eq!(span.dur, 500);
                assert_eq!(tid, 0);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_irq_exit_does_not_pair_across_cpus() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        let entry = line(0, 1_000, "irq_handler_entry", "irq=42 name=eth0");
        decoders.classify(&entry, &mut tracker).unwrap();

        let exit = line(1, 2_000, "irq_handler_exit", "irq=42 ret=handled");
        assert!(matches!(
            decoders.classify(&exit, &mut tracker).unwrap(),
            Classification::Instant { .. }
        ));
    }

    #[test]
    fn test_softirq_pair() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        let entry = line(3, 10_000, "softirq_entry", "vec=9 [action=RCU]");
        decoders.classify(&entry, &mut tracker).unwrap();

        let exit = line(3, 10_250, "softirq_exit", "vec=9 [action=RCU]");
        match decoders.classify(&exit, &mut tracker).unwrap() {
            Classification::Complete { cat, span, tid } => {
                assert_eq!(cat, "softirq");
                assert_eq!(span.label, "RCU");
                assert_eq!(span.dur, 250);
                assert_eq!(tid, 3);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_block_rq_keyed_by_device_and_sector() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        let insert = line(
            1,
            5_000,
            "block_rq_insert",
            "259,0 WS 4096 () 1000 + 8 [kworker/0:1]",
        );
        decoders.classify(&insert, &mut tracker).unwrap();

        // Same device but different sector must not pair.
        let other = line(1, 5_100, "block_rq_complete", "259,0 WS () 2000 + 8 [0]");
        assert!(matches!(
            decoders.classify(&other, &mut tracker).unwrap(),
            Classification::Instant { .. }
        ));

        let complete = line(1, 6_000, "block_rq_complete", "259,0 WS () 1000 + 8 [0]");
        match decoders.classify(&complete, &mut tracker).unwrap() {
            Classification::Complete { cat, span, tid } => {
                assert_eq!(cat, "block_rq");
                assert_eq!(span.label, "Comm=kworker/0:1");
                assert_eq!(span.start_ts, 5_000);
                assert_eq!(span.dur, 1_000);
                assert_eq!(tid, 1);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn test_sched_switch_ignores_swapper() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        // swapper -> myproc: opens a span, closes nothing.
        let to_proc = line(
            2,
            1_000,
            "sched_switch",
            "prev_comm=swapper/2 prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=myproc next_pid=1234 next_prio=120",
        );
        assert_eq!(
            decoders.classify(&to_proc, &mut tracker).unwrap(),
            Classification::Defer
        );
        assert_eq!(tracker.unmatched_closes(), 0);

        // myproc -> swapper: closes the running slice, opens nothing.
        let to_idle = line(
            2,
            1_700,
            "sched_switch",
            "prev_comm=myproc prev_pid=1234 prev_prio=120 prev_state=S ==> next_comm=swapper/2 next_pid=0 next_prio=120",
        );
        match decoders.classify(&to_idle, &mut tracker).unwrap() {
            Classification::Complete { cat, span, tid } => {
                assert_eq!(cat, "sched_switch");
                assert_eq!(span.label, "myproc");
                assert_eq!(span.dur, 700);
                assert_eq!(tid, 2);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_sched_switch_unpaired_close_emits_nothing() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        // No prior switch onto this CPU: the close cannot pair, and sched
        // never falls back to an instant event.
        let l = line(
            0,
            1_000,
            "sched_switch",
            "prev_comm=orphan prev_pid=99 prev_prio=120 prev_state=D ==> next_comm=swapper/0 next_pid=0 next_prio=120",
        );
        assert_eq!(
            decoders.classify(&l, &mut tracker).unwrap(),
            Classification::Defer
        );
        assert_eq!(tracker.unmatched_closes(), 1);
    }

    #[test]
    fn test_unrecognized_event_is_instant_with_pid_tid() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        let l = line(1, 1_000, "sched_wakeup", "comm=other pid=7 prio=120 target_cpu=001");
        assert_eq!(
            decoders.classify(&l, &mut tracker).unwrap(),
            Classification::Instant {
                cat: "sched_wakeup".to_string(),
                tid: 42,
            }
        );
    }

    #[test]
    fn test_malformed_recognized_event_is_an_error() {
        let decoders = EventDecoders::new();
        let mut tracker = DurationTracker::new();

        let l = line(0, 1_000, "irq_handler_entry", "garbage payload");
        assert!(decoders.classify(&l, &mut tracker).is_err());
    }
}
