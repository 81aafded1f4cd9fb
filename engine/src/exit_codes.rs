//! Stable exit codes for a CLI driving the engine.

/// Every selected validator succeeded.
pub const OK: i32 = 0;
/// At least one validator failed, errored, or exhausted its retries.
pub const FAILED: i32 = 1;
/// The runner could not be built (settings, duplicate codes, initializer errors).
pub const INVALID: i32 = 2;
