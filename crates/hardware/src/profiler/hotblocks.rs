//! Block table shared by all vCPU callbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::report::{ExecCount, ProfileReport};
use crate::config::ProfilerConfig;

/// Returns the table key of a block.
#[inline]
pub const fn block_key(start_address: u64, instruction_count: u64) -> u64 {
    start_address ^ instruction_count
}

/// Counters for one block.
///
/// `execution_count` is atomic so the inline path can bump it without taking
/// the table lock; it only ever increases.
#[derive(Debug)]
pub struct BlockCounter {
    start_address: u64,
    instruction_count: u64,
    translation_count: AtomicI32,
    execution_count: AtomicU64,
}

impl BlockCounter {
    fn new(start_address: u64, instruction_count: u64) -> Self {
        Self {
            start_address,
            instruction_count,
            translation_count: AtomicI32::new(1),
            execution_count: AtomicU64::new(0),
        }
    }

    /// Counts one execution.
    #[inline]
    pub fn record_execution(&self) {
        let _ = self.execution_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current execution count.
    pub fn executions(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> ExecCount {
        ExecCount {
            start_address: self.start_address,
            translation_count: self.translation_count.load(Ordering::Relaxed),
            instruction_count: self.instruction_count,
            execution_count: self.execution_count.load(Ordering::Relaxed),
        }
    }
}

/// Result of translating a block: its key and a handle on its counters.
#[derive(Clone, Debug)]
pub struct Translation {
    key: u64,
    counter: Arc<BlockCounter>,
}

impl Translation {
    /// Returns the table key.
    pub const fn key(&self) -> u64 {
        self.key
    }

    /// Counts one execution without touching the table lock.
    #[inline]
    pub fn record_inline(&self) {
        self.counter.record_execution();
    }

    /// Returns the shared counters.
    pub fn counter(&self) -> &BlockCounter {
        &self.counter
    }
}

/// Hot-block table.
#[derive(Debug)]
pub struct HotBlocks {
    table: Mutex<HashMap<u64, Arc<BlockCounter>>>,
    inline: bool,
    started: Instant,
}

impl Default for HotBlocks {
    fn default() -> Self {
        Self::new(false)
    }
}

impl HotBlocks {
    /// Creates an empty table; the throughput clock starts now.
    pub fn new(inline: bool) -> Self {
        info!(inline, "hot-block profiler initialized");
        Self {
            table: Mutex::new(HashMap::new()),
            inline,
            started: Instant::now(),
        }
    }

    /// Creates a table from the profiler configuration section.
    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self::new(config.inline)
    }

    /// Returns `true` if executions are counted through [`Translation::record_inline`].
    pub const fn is_inline(&self) -> bool {
        self.inline
    }

    /// Records a translation of the block at `start_address`.
    ///
    /// The first translation inserts the block with a translation count of 1;
    /// later ones increment it.
    pub fn on_translate(&self, start_address: u64, instruction_count: u64) -> Translation {
        let key = block_key(start_address, instruction_count);
        let mut table = self.lock();
        let counter = table
            .entry(key)
            .and_modify(|c| {
                let _ = c.translation_count.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| Arc::new(BlockCounter::new(start_address, instruction_count)));
        debug!(key = format_args!("{key:#x}"), "block translated");
        Translation {
            key,
            counter: Arc::clone(counter),
        }
    }

    /// Records one execution of the block under `key`.
    ///
    /// # Panics
    ///
    /// If `key` was never returned by [`on_translate`](Self::on_translate).
    pub fn on_execute(&self, key: u64) {
        let table = self.lock();
        match table.get(&key) {
            Some(counter) => counter.record_execution(),
            None => panic!("execution of untranslated block {key:#x}"),
        }
    }

    /// Records one execution along whichever path this table was built for.
    pub fn execute(&self, translation: &Translation) {
        if self.inline {
            translation.record_inline();
        } else {
            self.on_execute(translation.key());
        }
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been translated.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the counters for `key`.
    pub fn get(&self, key: u64) -> Option<ExecCount> {
        self.lock().get(&key).map(|c| c.snapshot())
    }

    /// Builds a report of the `top_n` hottest blocks, timed since construction.
    pub fn report(&self, top_n: usize) -> ProfileReport {
        self.report_at(top_n, self.started.elapsed())
    }

    /// Builds a report of the `top_n` hottest blocks over `elapsed` wall-clock time.
    pub fn report_at(&self, top_n: usize, elapsed: Duration) -> ProfileReport {
        let entries: Vec<ExecCount> = self.lock().values().map(|c| c.snapshot()).collect();
        ProfileReport::build(entries, top_n, elapsed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<BlockCounter>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
