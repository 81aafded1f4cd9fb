//! Concurrent rule-execution engine for addon validators.
//!
//! A fixed catalog of independent checks runs against one shared
//! [`input::AddonSubject`]. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic values (codes, results, backoff
//!   policies). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (settings files, HTTP lookups).
//!
//! Orchestration modules ([`runner`], [`middleware`], [`registry`],
//! [`filter`]) turn registered [`validator::Initializer`]s into a code-keyed
//! table, wrap each validator with the middleware chain, and fan runs out
//! across tokio tasks.

pub mod context;
pub mod core;
pub mod deps;
pub mod exit_codes;
pub mod filter;
pub mod input;
pub mod io;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod report;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validator;

pub use crate::context::RunContext;
pub use crate::core::code::{Code, CodeError};
pub use crate::filter::{Filter, matches_codes, not};
pub use crate::core::result::{ResultKind, ValidatorResult};
pub use crate::deps::{ClientError, Dependencies, ImageClient, QuotaClient};
pub use crate::input::{AddonBundle, AddonSubject};
pub use crate::report::Report;
pub use crate::runner::{ResultStream, Runner, RunnerConfig, RunnerError};
pub use crate::validator::{Base, Check, Initializer, Validator};
