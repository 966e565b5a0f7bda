//! Shared utilities for the Tessera engine.
//!
//! Currently this crate only hosts the profiling instrumentation used by
//! `tessera-ecs`. All macros compile to no-ops unless the `profiling`
//! feature is enabled.

pub mod profiling;
