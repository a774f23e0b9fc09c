//! Domain types shared across the queue system

mod priority;

pub use priority::Priority;
