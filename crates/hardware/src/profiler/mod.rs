//! Hot-block execution profiler.
//!
//! Counts how often each translated block is translated and executed, and
//! reports the hottest blocks with aggregate instruction throughput. It provides:
//! 1. **Table:** `HotBlocks`, a locked map from block key to shared atomic counters.
//! 2. **Callbacks:** `on_translate` when the host translates a block, `on_execute` each time it runs.
//! 3. **Report:** Sorted, truncated snapshot with totals, text rendering, and a mirror file.
//!
//! Blocks are keyed by `start_address ^ instruction_count`. Two distinct blocks
//! may alias to one key; their counts are then merged, which is accepted.

/// Block table and callbacks.
pub mod hotblocks;

/// Report snapshot and rendering.
pub mod report;

pub use hotblocks::{BlockCounter, HotBlocks, Translation, block_key};
pub use report::{ExecCount, ProfileReport};
