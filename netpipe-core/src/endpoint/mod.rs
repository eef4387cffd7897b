//! Building blocks shared by the TCP endpoints.
//!
//! This module holds everything an endpoint needs besides the socket itself:
//! IPv4 addressing, the three-state lifecycle with its monotonic transition
//! rule, and the chunked byte queue with its FIFO extraction algorithm.

pub mod addr;
pub use addr::Ipv4Address;

pub mod state;
pub use state::{EndpointState, StateCell};

pub mod queue;
pub use queue::ChunkQueue;
