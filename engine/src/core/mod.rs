//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values and return deterministic outputs suitable for tests; randomness is
//! injected through [`delay::DurationRandomizer`].

pub mod code;
pub mod delay;
pub mod result;
