//! OSC bus transport: reuse-port UDP broadcast and the typed message
//! vocabulary carried on each port.

pub mod bus;
pub mod message;
pub mod socket;

pub use bus::{ListenerHandle, OscBus, OscBusError};
pub use message::BusMessage;
pub use socket::bind_reuse_port;
