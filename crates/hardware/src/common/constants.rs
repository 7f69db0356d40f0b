//! Constants shared across the window, the bridge, and the profiler.

/// Default window base in the simulated physical address space (8 GiB).
pub const DEFAULT_WINDOW_BASE: u64 = 0x2_0000_0000;

/// Default window size (4 GiB).
pub const DEFAULT_WINDOW_SIZE: u64 = 0x1_0000_0000;

/// Default link latency in logical time units, used when none (or zero) is configured.
pub const DEFAULT_LINK_LATENCY: u64 = 500_000;

/// Largest single memory transaction in bytes.
pub const MAX_ACCESS_BYTES: usize = 8;

/// Address-space identifier carried on every bridged request.
pub const DEFAULT_ADDRESS_SPACE: u32 = 0;

/// Default number of rows in the profiler report.
pub const DEFAULT_REPORT_LIMIT: usize = 20;

/// File-name prefix for mirrored profiler totals.
pub const DEFAULT_MIRROR_PREFIX: &str = "output_ips_";

/// Number of numbered mirror files tried before giving up.
pub const DEFAULT_MIRROR_SLOTS: usize = 100;
