use std::io::{self, Write};

use serde::Serialize;

use crate::orchestrator::RunSummary;
use crate::pipeline::Terminal;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summaries(summaries: &[RunSummary]) -> io::Result<()> {
        Self::print_json(&summaries)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_summaries(summaries: &[RunSummary]) -> io::Result<()> {
        let mut stdout = io::stdout();
        for summary in summaries {
            stdout.write_all(summary_line(summary).as_bytes())?;
            stdout.write_all(b"\n")?;
            for outcome in summary.outcomes.iter().filter(|o| o.terminal.is_failure()) {
                let detail = match &outcome.terminal {
                    Terminal::FetchFailed { reason } => format!("fetch failed: {reason}"),
                    Terminal::Invalid { reason } => format!("invalid: {reason}"),
                    Terminal::PersistFailed { reason } => format!("not saved: {reason}"),
                    _ => continue,
                };
                writeln!(stdout, "  {} {detail}", outcome.identifier)?;
            }
        }
        Ok(())
    }
}

pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{}: {} identifiers, {} persisted ({} with warnings), {} cached, {} failed",
        summary.source,
        summary.total,
        summary.persisted,
        summary.warnings,
        summary.cached,
        summary.failures()
    )
}
