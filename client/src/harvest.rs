//! Output harvester: turns a sploit's output stream into queued flags.

use std::collections::BTreeSet;
use std::io::{self, BufRead, BufReader, Read, Write};

use tracing::{error, info, warn};

use crate::core::flags::FlagFormat;
use crate::store::FlagStore;

/// What one instance printed, kept for display.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Harvest {
    /// Output lines, only collected when they will be displayed.
    pub lines: Vec<String>,
    /// Distinct flags found in this instance's output, new or not.
    pub flags: BTreeSet<String>,
}

/// Read `reader` to EOF, queueing every flag found into `store` as it
/// appears.
///
/// Lines are decoded lossily, so non-UTF-8 output never aborts the harvest.
/// On a read error the flags queued so far stay queued.
pub fn harvest_output<R: Read>(
    reader: R,
    team: &str,
    format: &FlagFormat,
    store: &FlagStore,
    keep_lines: bool,
) -> io::Result<Harvest> {
    let mut reader = BufReader::new(reader);
    let mut harvest = Harvest::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);

        let flags = format.find_flags(&line);
        if !flags.is_empty() {
            store.add(&flags, team);
            harvest.flags.extend(flags);
        }
        if keep_lines {
            harvest.lines.push(line.into_owned());
        }
    }

    Ok(harvest)
}

/// Print an instance's output, each line prefixed with the team name.
///
/// The whole block is written under one stdout lock so concurrent instances
/// never interleave.
pub fn display_output(team: &str, lines: &[String]) {
    if lines.is_empty() {
        info!(team, "no output from the sploit");
        return;
    }

    let mut block = String::from("\n");
    for line in lines {
        block.push_str(team);
        block.push_str(": ");
        block.push_str(line.trim_end());
        block.push('\n');
    }
    let mut stdout = io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{block}").and_then(|()| stdout.flush()) {
        warn!(team, err = %err, "failed to print sploit output");
    }
}

/// Harvester body run next to each instance.
///
/// Never fails: read errors are logged here and go no further. `display`
/// is re-evaluated after EOF so output is not printed during shutdown.
pub fn run_harvester<R: Read>(
    reader: R,
    team: &str,
    format: &FlagFormat,
    store: &FlagStore,
    verbose: bool,
    display: impl FnOnce() -> bool,
) {
    let harvest = match harvest_output(reader, team, format, store, verbose) {
        Ok(harvest) => harvest,
        Err(err) => {
            error!(team, err = %err, "failed to process sploit output");
            return;
        }
    };

    if verbose && display() {
        display_output(team, &harvest.lines);
        if !harvest.flags.is_empty() {
            let flags: Vec<&str> = harvest.flags.iter().map(String::as_str).collect();
            info!(
                team,
                count = flags.len(),
                flags = %flags.join(", "),
                "got flags"
            );
        }
    }
}
