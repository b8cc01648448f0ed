#![no_std]

// Shared logic for the pulse presence indicator.
//
// Everything here stays free of the Rust standard library so the same
// dispatch tables, timer contract, and state machine compile for the MCU
// firmware and for the host-side emulator and tests.

pub mod exti;
pub mod indicator;
pub mod presence;
pub mod self_test;
pub mod sim;
pub mod telemetry;
pub mod timer;
