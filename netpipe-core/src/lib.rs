//! Platform-free building blocks for long-lived TCP endpoints: the endpoint
//! state machine, chunked byte queues, IPv4 addressing, and a monotonic
//! clock.
//!
//! The OS-facing endpoints themselves live in the sibling `netpipe-sock`
//! crate; everything here is independent of any socket API.

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod log;

pub mod clock;

pub mod endpoint;

pub mod error;
pub use error::{AddrError, Error, Result};
