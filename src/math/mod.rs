//! Numerical building blocks: basis libraries, dense solves and constrained NNLS.

pub mod basis;
pub mod dense;
pub mod nnls;

pub use basis::*;
pub use dense::*;
pub use nnls::{FreeSet, NnlsOptions, NnlsWorkspace};
