//! Side-effecting collaborators: settings files and network lookups.

pub mod config;
pub mod http;
