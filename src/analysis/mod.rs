//! Analysis modules.
//!
//! Summary statistics over the record list.

pub mod aggregator;

pub use aggregator::*;
