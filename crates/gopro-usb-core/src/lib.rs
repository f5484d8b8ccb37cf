//! gopro-usb Core - Shared types and protocol definitions
//!
//! This crate provides the foundational types used across all gopro-usb components:
//! configuration, errors, the message-channel protocol and the serial/address rules
//! used to locate a camera on its USB network.

pub mod config;
pub mod error;
pub mod protocol;
pub mod serial;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{Method, MethodReply, MethodRequest, MethodResponse};
pub use serial::{
    derive_address, extract_serial, DerivedAddress, RunLengthMatcher, SerialMatcher,
    SerialToken, FALLBACK_ADDRESS,
};
