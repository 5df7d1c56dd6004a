//! ftrace plaintext line grammar.
//!
//! An ftrace record line looks like:
//!
//! ```text
//!           <idle>-0       (-------) [002] d..2.  100.001221: sched_switch: prev_comm=...
//! ```
//!
//! Seven fields precede the free-text info payload: task name, pid, the
//! tgid/flags column, CPU index, scheduling-state flags, a fractional-second
//! timestamp, and the event kind. Anything that does not match the grammar
//! (headers, comments, blank lines) is expected in ftrace output and skipped.

use regex::Regex;

/// One decoded ftrace record.
///
/// The timestamp is converted to integer microseconds at parse time; Chrome
/// trace `ts`/`dur` fields are natively microseconds, so no further scaling
/// happens downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct FtraceLine {
    pub task_name: String,
    pub pid: i64,
    pub tgid: String,
    pub cpu: u32,
    pub cpu_state: String,
    pub timestamp_us: u64,
    pub event: String,
    pub info: String,
}

pub struct LineParser {
    line_re: Regex,
}

impl LineParser {
    pub fn new() -> Self {
        // Task names may themselves contain '-', so the name class is split
        // from the pid by the last '-<digits>' before the tgid column
        // ("kworker/u8:1-370" parses as name "kworker/u8:1", pid 370).
        let line_re = Regex::new(
            r"^\s*([-\w<>.:/() ]+)-(\d+)\s+(\([\d -]+\))\s+\[(\d+)\]\s+([\w.]+)\s+(\d+)\.(\d+):\s+(\w+):\s(.+)$",
        )
        .unwrap();
        LineParser { line_re }
    }

    /// Decode one input line. Returns `None` when the line is not an ftrace
    /// record.
    pub fn parse(&self, line: &str) -> Option<FtraceLine> {
        let caps = self.line_re.captures(line.trim_end())?;
        Some(FtraceLine {
            task_name: caps[1].to_string(),
            pid: caps[2].parse().ok()?,
            tgid: caps[3].to_string(),
            cpu: caps[4].parse().ok()?,
            cpu_state: caps[5].to_string(),
            timestamp_us: timestamp_us(&caps[6], &caps[7])?,
            event: caps[8].to_string(),
            info: caps[9].to_string(),
        })
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a `<seconds>.<fraction>` timestamp into integer microseconds.
///
/// The fraction is handled as a digit string rather than a float so that
/// values like `1.000500` convert exactly; digits beyond microsecond
/// resolution are truncated.
fn timestamp_us(secs: &str, frac: &str) -> Option<u64> {
    let secs: u64 = secs.parse().ok()?;
    let mut digits = frac.to_string();
    digits.truncate(6);
    while digits.len() < 6 {
        digits.push('0');
    }
    let micros: u64 = digits.parse().ok()?;
    Some(secs * 1_000_000 + micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sched_switch_line() {
        let parser = LineParser::new();
        let line = "          <idle>-0       (-------) [002] d..2.  100.001221: sched_switch: prev_comm=swapper/2 prev_pid=0 prev_prio=120 prev_state=R ==> next_comm=myproc next_pid=1234 next_prio=120";
        let parsed = parser.parse(line).expect("line should match");
        assert_eq!(parsed.task_name, "<idle>");
        assert_eq!(parsed.pid, 0);
        assert_eq!(parsed.tgid, "(-------)");
        assert_eq!(parsed.cpu, 2);
        assert_eq!(parsed.cpu_state, "d..2.");
        assert_eq!(parsed.timestamp_us, 100_001_221);
        assert_eq!(parsed.event, "sched_switch");
        assert!(parsed.info.starts_with("prev_comm=swapper/2"));
    }

    #[test]
    fn test_parse_task_name_with_dashes() {
        let parser = LineParser::new();
        let line = " kworker/u8:1-370     (  370) [001] d.h1.  5.000000: irq_handler_entry: irq=42 name=eth0";
        let parsed = parser.parse(line).expect("line should match");
        assert_eq!(parsed.task_name, "kworker/u8:1");
        assert_eq!(parsed.pid, 370);
        assert_eq!(parsed.cpu, 1);
        assert_eq!(parsed.event, "irq_handler_entry");
        assert_eq!(parsed.info, "irq=42 name=eth0");
    }

    #[test]
    fn test_headers_and_comments_skipped() {
        let parser = LineParser::new();
        assert!(parser.parse("# tracer: nop").is_none());
        assert!(parser.parse("#           TASK-PID     CPU#  TIMESTAMP  FUNCTION").is_none());
        assert!(parser.parse("").is_none());
    }

    #[test]
    fn test_timestamp_microseconds_exact() {
        assert_eq!(timestamp_us("1", "000500"), Some(1_000_500));
        assert_eq!(timestamp_us("0", "000000"), Some(0));
        // Short fractions are padded, long ones truncated.
        assert_eq!(timestamp_us("12", "3"), Some(12_300_000));
        assert_eq!(timestamp_us("1", "0005009"), Some(1_000_500));
    }
}
