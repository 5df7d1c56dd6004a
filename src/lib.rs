//! ftrace2perfetto library - converts ftrace plaintext traces into
//! Chrome/Perfetto-compatible JSON.
//!
//! # Modules
//!
//! - [`ftrace`] - line grammar for ftrace plaintext records
//! - [`events`] - per-event-kind decoders and line classification
//! - [`duration`] - start/end pairing of duration events
//! - [`perfetto`] - track allocation and Chrome trace JSON output
//! - [`convert`] - the single-pass conversion loop
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{BufReader, BufWriter};
//!
//! let input = BufReader::new(File::open("ftrace.txt").unwrap());
//! let output = BufWriter::new(File::create("trace.json").unwrap());
//! let stats = ftrace2perfetto::convert(input, output).unwrap();
//! println!("{} duration slices emitted", stats.complete_events);
//! ```

pub mod convert;
pub mod duration;
pub mod events;
pub mod ftrace;
pub mod perfetto;

// Re-export for convenience
pub use convert::{convert, ConvertStats};
