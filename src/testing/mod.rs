//! Testing utilities and mock implementations
//!
//! Lets sessions be driven without a live MQTT broker.

pub mod mocks;

pub use mocks::*;
