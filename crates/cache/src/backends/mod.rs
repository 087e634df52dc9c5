//! Cache driver implementations

pub mod memory;

pub use memory::*;
