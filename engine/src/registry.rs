//! Process-wide list of validator initializers.
//!
//! Validator modules call [`register`] once during start-up. A runner takes a
//! snapshot with [`registered`] when it is built, so later registrations never
//! change an existing runner.

use std::sync::{LazyLock, Mutex, MutexGuard};

use crate::validator::Initializer;

static INITIALIZERS: LazyLock<Mutex<Vec<Initializer>>> = LazyLock::new(|| Mutex::new(Vec::new()));

fn initializers() -> MutexGuard<'static, Vec<Initializer>> {
    INITIALIZERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append an initializer to the global list.
pub fn register(initializer: Initializer) {
    let mut list = initializers();
    list.push(initializer);
    tracing::debug!(registered = list.len(), "validator initializer registered");
}

/// Snapshot of every initializer registered so far.
pub fn registered() -> Vec<Initializer> {
    initializers().clone()
}
