//! Minimal ICMP echo engine over IPv4 raw sockets.
//!
//! Outbound: [`build_echo`] then [`build_ipv4`], handed to
//! [`transport::send`]. Inbound: [`transport::listen`] feeds each datagram
//! to [`classify`], whose [`Descriptor`] renders as a one-line report (plus
//! the quoted header for ICMP errors).

pub mod args;
pub mod checksum;
pub mod classify;
pub mod cursor;
pub mod error;
pub mod icmp;
pub mod ipv4;
pub mod report;
pub mod transport;

pub use checksum::checksum;
pub use classify::{Descriptor, Message, classify};
pub use error::{DecodeError, ParseError, TransportError};
pub use icmp::{PAIRING_ID, build_echo};
pub use ipv4::build_ipv4;
