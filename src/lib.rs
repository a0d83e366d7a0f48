//! # sdnd
//!
//! An OpenFlow 1.3 controller that turns every connected switch into a
//! learning switch whose learned flows share a single rate-limiting meter.
//! The meter's rate is picked from a weekly schedule when the switch connects.

pub mod config;
pub mod meter;
pub mod openflow;
pub mod packet;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod transport;
mod utils;

pub use config::ControllerConfig;
pub use policy::BandwidthPolicy;
pub use session::{SessionManager, SwitchSession};
pub use transport::{serve, SwitchApp};
