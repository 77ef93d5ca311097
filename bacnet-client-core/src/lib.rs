//! Request-correlation core for a BACnet client: four concurrent tables, a
//! receiver thread, service handlers, and the public read/write/discover
//! operations that sit on top of them. Runs on plain OS threads — the
//! surrounding gateway hosts it via `tokio::task::spawn_blocking`.

mod address;
mod bind;
mod codec;
mod config;
mod driver;
mod error;
mod handlers;
mod names;
mod operations;
mod receiver;
mod stack;
mod tables;
mod tsm;

pub use address::BacnetAddress;
pub use codec::PropertyValue;
pub use config::DriverConfig;
pub use driver::Driver;
pub use error::DriverError;
pub use operations::DiscoveredDevice;
pub use stack::{mock, BacnetStack, DecodedApdu, IpStack};
