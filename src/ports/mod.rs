//! Port traits: the boundaries between the simulator and the outside world.

pub mod config_port;
pub mod data_port;
pub mod report_port;
pub mod signal_port;
