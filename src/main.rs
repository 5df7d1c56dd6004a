use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ftrace2perfetto::convert;

#[derive(Debug, Parser)]
#[command(name = "ftrace2perfetto")]
#[command(about = "Convert an ftrace plaintext trace into Chrome/Perfetto JSON")]
#[command(version)]
struct Command {
    /// ftrace plaintext file to convert
    input: PathBuf,

    /// The name of the output file
    #[arg(short, long, default_value = "trace.json")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let opts = Command::parse();

    if !opts.input.exists() {
        bail!("Input not found: {}", opts.input.display());
    }

    let input = File::open(&opts.input)
        .with_context(|| format!("Failed to open {}", opts.input.display()))?;
    let output = File::create(&opts.output)
        .with_context(|| format!("Failed to create {}", opts.output.display()))?;

    let stats = convert(BufReader::new(input), BufWriter::new(output))?;

    println!(
        "Converted {}/{} lines into {} complete and {} instant events -> {}",
        stats.lines_matched,
        stats.lines_read,
        stats.complete_events,
        stats.instant_events,
        opts.output.display()
    );
    if stats.malformed_events + stats.span_overwrites + stats.unmatched_closes + stats.dropped_pending > 0
    {
        println!(
            "Data-quality warnings: {} malformed, {} overwritten, {} unmatched, {} dropped pending",
            stats.malformed_events,
            stats.span_overwrites,
            stats.unmatched_closes,
            stats.dropped_pending
        );
    }

    Ok(())
}
