//! Network emulation: effects, traffic filters, `tc` commands and the
//! apply/revert lifecycle.

mod effect;
mod filter;
mod runner;
pub mod tc;

pub use effect::{NetemEffect, DELAY_DISTRIBUTIONS};
pub use filter::{parse_ports, validate_interface, Cidr, TrafficFilter};
pub use runner::{run_netem, NetemPlan, TcRunner, REVERT_TIMEOUT};
