//! Structured logging wiring and failure-capture test tooling.
//!
//! Two halves with a strict separation:
//!
//! - **Process-wide wiring** ([`config`], [`levels`], [`overrides`],
//!   [`environments`], [`panic_hook`]): installs the global `tracing`
//!   subscriber once per process, picks JSON or console output by
//!   deployment environment, and applies per-target level/destination
//!   overrides sourced from environment variables.
//! - **Per-unit capture** ([`capture`]): a harness plugin that buffers
//!   output across each test unit's setup/call/teardown lifecycle and
//!   persists it to per-unit directories only on failure.
//!
//! The two meet at one seam: the main format layer writes through the
//! capture-aware stdout handle, so log lines emitted during a captured
//! phase end up in that unit's buffers instead of the terminal.

pub mod capture;
pub mod config;
pub mod environments;
pub mod levels;
pub mod overrides;
pub mod panic_hook;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
