//! Configuration and shared domain types.
//!
//! This module defines:
//!
//! - fitting settings (`FitSettings`, `BasisSettings`, `SmoothstepCurve`, `SampleOrder`)
//! - the synthetic stream configuration used by the demo harness (`SyntheticConfig`)
//! - the resolved run configuration of the `bfit` binary (`FitConfig`)

pub mod types;

pub use types::*;
