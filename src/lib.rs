//! `brdf-basis-fit` library crate.
//!
//! A streaming, constrained least-squares engine that fits one non-negative combination of
//! "library" basis functions per system (typically per texel) from a single pass over a lazy
//! stream of sample batches.
//!
//! The binary (`bfit`) is a thin wrapper around this library so that:
//!
//! - the engine is testable without spawning processes
//! - the sample producer (renderer, capture pipeline, synthetic generator) stays pluggable
//!   through [`fit::SampleModel`]

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
pub mod telemetry;
