//! Protocol and node constants.

/// Consensus and pool knobs.
pub mod consensus {
    /// Most transactions one proposal may carry.
    pub const DEFAULT_MAX_TX_PER_BLOCK: usize = 10_000;

    /// How long the collector waits for the pool to fill before sampling.
    pub const DEFAULT_MAX_WAIT_MS: u64 = 1_000;

    /// Cadence of the REQUEST_BLOCK self-trigger driving catch-up.
    pub const REQUEST_BLOCK_INTERVAL_SECS: u64 = 10;

    /// Grace period for worker tasks to drain on shutdown.
    pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
}
