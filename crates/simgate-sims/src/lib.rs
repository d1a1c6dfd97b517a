//! Reference simulators for the Simgate backend.
//!
//! # Modules
//!
//! - [`rc_filter`] -- RC low-pass filter driven by a square wave.

pub mod rc_filter;

use simgate_core::simulator::SimulatorRegistry;

pub use rc_filter::RcFilter;

/// A registry holding every bundled simulator.
pub fn registry() -> SimulatorRegistry {
    SimulatorRegistry::new().with(RcFilter)
}
