//! Sensor subsystem.
//!
//! Only the flow sensor is fitted.  Its ISR-side accumulator and the
//! main-loop [`FlowSensor`](flow::FlowSensor) driver live in [`flow`].

pub mod flow;
