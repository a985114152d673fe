//! Configuration constants for the promise runtime
//!
//! This module contains tunable parameters that affect the runtime loop and
//! the background pool. `RuntimeBuilder` overrides them per runtime.

/// Upper bound on how long an idle runtime parks waiting for completions
/// (in milliseconds)
///
/// The runtime parks on its inbox while work is in flight elsewhere. A timer
/// deadline shortens the park; this value caps it so a quiet runtime still
/// re-checks its queues regularly.
pub const IDLE_PARK_TIMEOUT_MS: u64 = 10;

/// Prefix for background worker thread names
pub const BACKGROUND_THREAD_PREFIX: &str = "minipromise-bg";

/// Default name of a runtime built without an explicit name
pub const DEFAULT_RUNTIME_NAME: &str = "main";

/// Default number of background workers: one per logical CPU.
pub fn default_background_threads() -> usize {
    num_cpus::get().max(1)
}
