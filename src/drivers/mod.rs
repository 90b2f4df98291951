//! Hardware initialisation and the flow tick timer.

pub mod hw_init;
pub mod hw_timer;
