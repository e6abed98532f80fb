//! The fitting engine.
//!
//! Responsibilities:
//!
//! - turn streamed batches into per-system [`Sample`]s (`sample`, `builder`)
//! - accumulate the normal equations in one pass (`sums`, `contribute`, `builder`, `linear`)
//! - solve every system under non-negativity and equality constraints (`solve`)
//! - reconstruct fitted curves (`evaluate`)
//! - cross-check the streamed systems against a dense construction (`reference`)

pub mod builder;
pub mod contribute;
pub mod evaluate;
pub mod linear;
pub mod reference;
pub mod sample;
pub mod solve;
pub mod sums;
pub mod system;

pub use builder::*;
pub use contribute::contribute;
pub use evaluate::*;
pub use linear::*;
pub use reference::*;
pub use sample::*;
pub use solve::*;
pub use sums::*;
pub use system::*;
