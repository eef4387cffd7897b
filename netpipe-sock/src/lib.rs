//! POSIX socket backend for [netpipe-core], exposing long-lived TCP
//! endpoints with a thread-safe, non-blocking API.
//!
//! Each endpoint owns one OS socket and one background worker thread that
//! pumps bytes (or accepted connections) between the socket and in-memory
//! queues. Callers only ever touch the queues.
//!
//! [netpipe-core]: https://github.com/netpipe/netpipe/tree/main/netpipe-core

#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

#[cfg(not(unix))]
compile_error!("This crate is only compatible with systems that provide AF_INET sockets and poll(2).");

pub mod net;

pub(crate) mod sys;

/// Creates a [netpipe_core::Error::Io] with a message prefixed to the `errno`
/// value.
macro_rules! errno {
    ($($arg:tt)+) => {{
        let errno = ::std::io::Error::last_os_error();
        let prefix = format!($($arg)+);
        netpipe_core::Error::Io(::std::io::Error::new(errno.kind(), format!("{prefix}: {errno}")))
    }};
}
pub(crate) use errno;
