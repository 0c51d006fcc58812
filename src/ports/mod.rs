//! Port traits: the seams between domain logic and the outside world.

pub mod chart_port;
pub mod config_port;
pub mod data_port;
pub mod http_port;
