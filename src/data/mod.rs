//! Sample producers.

pub mod synthetic;

pub use synthetic::*;
