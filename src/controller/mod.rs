//! Connection lifecycle controller.
//!
//! This module contains:
//! - [`event`]: states, inbound driver events and outbound commands
//! - [`button`]: press-duration measurement
//! - [`lifecycle`]: the state machine itself

mod button;
mod event;
mod lifecycle;

pub use button::{ButtonPress, ButtonTracker, PressThresholds};
pub use event::{
    Command, ConnectionState, DriverEvent, LinkState, ProvisionResult, ResumeFailure,
};
pub use lifecycle::{Controller, Timing};
