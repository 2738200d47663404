//! Policy knobs.
//!
//! No ambient global state is required anywhere in this crate (the
//! huge-page resolver re-reads `/proc/self/pagemap` on every call, the
//! device handle is passed explicitly). The one configurable policy named
//! in the design notes — the `ScatterBuffer` soft size cap — is carried
//! here as an explicit value rather than a constant, so callers can raise
//! or lower it without forking the crate.

/// Soft cap applied to `ScatterBuffer::new`. The descriptor page has room
/// for far more (1 MiB / 32 bytes = 32768 slots x 2^27 bytes = 4 TiB), but
/// 3 GiB is the default operating envelope this driver was built for.
pub const DEFAULT_SCATTER_MAX_SIZE: u64 = 3 * (1 << 30);

/// Configuration for a `ScatterBuffer`.
#[derive(Debug, Clone, Copy)]
pub struct ScatterBufferConfig {
    pub max_size: u64,
}

impl Default for ScatterBufferConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_SCATTER_MAX_SIZE,
        }
    }
}

impl ScatterBufferConfig {
    pub fn with_max_size(max_size: u64) -> Self {
        Self { max_size }
    }
}
