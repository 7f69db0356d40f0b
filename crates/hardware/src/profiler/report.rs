//! Profiler report snapshot and rendering.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::common::constants::{DEFAULT_MIRROR_PREFIX, DEFAULT_MIRROR_SLOTS};

const RULE: &str = "=================";

/// Counters of one block at report time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ExecCount {
    /// Guest address of the first instruction.
    pub start_address: u64,
    /// Times the block was translated.
    pub translation_count: i32,
    /// Instructions in the block.
    pub instruction_count: u64,
    /// Times the block was executed.
    pub execution_count: u64,
}

/// Snapshot of the hottest blocks with aggregate throughput.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfileReport {
    /// Distinct keys in the table.
    pub entries: usize,
    /// Hottest blocks, most executed first.
    pub rows: Vec<ExecCount>,
    /// `Σ instruction_count × execution_count` over every block, not only `rows`.
    pub total_instructions: u64,
    /// `total_instructions` divided by elapsed wall-clock seconds (0 if none elapsed).
    pub instructions_per_second: f64,
}

impl ProfileReport {
    pub(crate) fn build(mut entries: Vec<ExecCount>, top_n: usize, elapsed: Duration) -> Self {
        let total_instructions = entries.iter().fold(0u64, |acc, e| {
            acc.saturating_add(e.instruction_count.saturating_mul(e.execution_count))
        });
        let seconds = elapsed.as_secs_f64();
        let instructions_per_second = if seconds > 0.0 {
            total_instructions as f64 / seconds
        } else {
            0.0
        };

        let count = entries.len();
        entries.sort_by(|a, b| {
            b.execution_count
                .cmp(&a.execution_count)
                .then(a.start_address.cmp(&b.start_address))
        });
        entries.truncate(top_n);

        Self {
            entries: count,
            rows: entries,
            total_instructions,
            instructions_per_second,
        }
    }

    /// Returns `true` if no block was ever translated.
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Renders the two totals lines.
    pub fn totals(&self) -> String {
        format!(
            "{RULE} Total instructions {RULE} : {}\n{RULE} Total instructions per second {RULE} : {:.6}\n",
            self.total_instructions, self.instructions_per_second
        )
    }

    /// Writes the totals to the first `output_ips_<i>.txt` in `dir` that does not exist yet.
    ///
    /// # Errors
    ///
    /// Any I/O error other than the candidate file already existing.
    pub fn mirror_to_first_free(&self, dir: &Path) -> io::Result<Option<PathBuf>> {
        self.mirror_with_slots(dir, DEFAULT_MIRROR_SLOTS)
    }

    /// Like [`mirror_to_first_free`](Self::mirror_to_first_free), trying `slots` names.
    ///
    /// Returns `None` for an empty report or when every name is taken.
    ///
    /// # Errors
    ///
    /// Any I/O error other than the candidate file already existing.
    pub fn mirror_with_slots(&self, dir: &Path, slots: usize) -> io::Result<Option<PathBuf>> {
        if self.is_empty() {
            return Ok(None);
        }
        for i in 0..slots {
            let path = dir.join(format!("{DEFAULT_MIRROR_PREFIX}{i}.txt"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(self.totals().as_bytes())?;
                    info!(path = %path.display(), "profiler totals mirrored");
                    return Ok(Some(path));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err),
            }
        }
        warn!(dir = %dir.display(), slots, "no free mirror file name");
        Ok(None)
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "collected {} entries in the hash table", self.entries)?;
        if self.is_empty() {
            return writeln!(f, "{RULE} No data found {RULE}");
        }
        writeln!(f, "pc, tcount, icount, ecount")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:#016x}, {}, {}, {}",
                row.start_address, row.translation_count, row.instruction_count, row.execution_count
            )?;
        }
        f.write_str(&self.totals())
    }
}
