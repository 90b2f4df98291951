//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for FilterMon: flow
//! integration, the cartridge ledger with remaining-life projection,
//! reset commands, and the publish/status renderings.  All interaction
//! with hardware happens through **port traits** defined in [`ports`],
//! keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod integrator;
pub mod ledger;
pub mod ports;
pub mod publish;
pub mod service;
pub mod status;
pub mod timestamp;
