//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against
//! mock ports.  All tests run on the host with no real hardware.

mod command_tests;
mod mock_ports;
mod persistence_tests;
mod service_tests;

// Host critical-section implementation backing the ingress channel.
use critical_section as _;
