//! Fixed capacities of the interpreter.

pub use tacit_asm::{SLOT_COUNT, STREAM_BYTES};
pub use tacit_types::{HANDLE_COUNT, MAX_COUNT, MAX_ROWS};

/// Scopes: one per letter plus the top level.
pub const SCOPE_COUNT: usize = 27;

/// Index of the top-level scope.
pub const TOP_SCOPE: usize = 26;

/// Number of pool size classes; class `k` blocks span `64 << k` bytes.
pub const CLASS_COUNT: usize = 30;

/// Words per 64-byte pool lane.
pub const LANE_WORDS: usize = 8;

/// Size class at and above which the arena is extended directly instead of
/// splitting a parent block.
pub const GROW_CLASS: usize = 16;

/// Hard ceiling on arena size, in lanes (1 GiB).
pub const ARENA_CAP_LANES: usize = 1 << 24;

/// Ceiling on a handle's reference count (6-bit field in the source layout).
pub const REFS_MAX: u8 = 63;

/// A kernel fans out to workers only above `WORKER_SPLIT_MIN` output
/// elements per configured worker.
pub const WORKER_SPLIT_MIN: usize = 512;

/// Display truncation width, including the trailing `..`.
pub const PRINT_WIDTH: usize = 191;
