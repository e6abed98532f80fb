//! Input/output helpers.
//!
//! - settings JSON loading (`settings`)
//! - solution JSON read/write (`solution`)
//! - curve CSV export (`export`)

pub mod export;
pub mod settings;
pub mod solution;

pub use export::*;
pub use settings::*;
pub use solution::*;
