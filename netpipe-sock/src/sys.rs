//! Thin wrappers around the POSIX socket API.
//!
//! Every syscall is checked in place and its `errno` captured immediately,
//! before any other call can clobber it. All byte-order swaps between
//! [Ipv4Address] and the `sockaddr_in` layout happen in this module and
//! nowhere else.

use netpipe_core::Result;
use netpipe_core::endpoint::Ipv4Address;

use std::os::unix::io::RawFd;
use std::{io, mem};

use crate::errno;

/// Connection backlog for listening sockets (see `listen(2)`).
const LISTEN_BACKLOG: libc::c_int = 8;

/// Readiness outcome of polling a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The timeout expired with nothing to read.
    TimedOut,
    /// Data (or a pending connection) is ready to be read.
    Readable,
}

/// Polls `fd` for readability, waiting at most `timeout_ms` milliseconds.
///
/// Any reported event other than plain readability is returned as an error.
pub fn poll_readable(fd: RawFd, timeout_ms: libc::c_int) -> Result<Readiness> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&raw mut pfd, 1, timeout_ms) };
    if result == -1 {
        return Err(errno!("failed to poll socket"));
    }
    if result == 0 {
        return Ok(Readiness::TimedOut);
    }
    if pfd.revents != libc::POLLIN {
        // Only POLLIN was requested, so anything else is an error event.
        return Err(netpipe_core::Error::Io(io::Error::other(format!(
            "poll returned error events: {:#06x}",
            pfd.revents
        ))));
    }

    Ok(Readiness::Readable)
}

/// An `AF_INET` stream socket owning its file descriptor.
#[derive(Debug)]
pub struct Socket {
    fd: RawFd,
}

impl Socket {
    fn new() -> Result<Socket> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        if fd == -1 {
            return Err(errno!("failed to create socket"));
        }
        Ok(Socket { fd })
    }

    /// Opens a socket connected to `remote`, with `TCP_NODELAY` enabled.
    pub fn connect(remote: Ipv4Address) -> Result<Socket> {
        let socket = Socket::new()?;

        let addr = to_sockaddr(remote);
        let result = unsafe {
            libc::connect(
                socket.fd,
                &raw const addr as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if result == -1 {
            return Err(errno!("failed to connect to {remote}"));
        }

        socket.set_nodelay()?;

        Ok(socket)
    }

    /// Opens a listening socket bound to `0.0.0.0:port` with a backlog of
    /// [LISTEN_BACKLOG].
    ///
    /// `SO_REUSEADDR` is set before binding so the port can be taken again
    /// right after a previous listener on it was closed.
    pub fn listen(port: u16) -> Result<Socket> {
        let socket = Socket::new()?;

        if socket.set_option(libc::SOL_SOCKET, libc::SO_REUSEADDR, 1) == -1 {
            return Err(errno!("failed to set SO_REUSEADDR"));
        }
        if socket.set_option(libc::IPPROTO_TCP, libc::TCP_NODELAY, 1) == -1 {
            return Err(errno!("failed to set TCP_NODELAY"));
        }

        let addr = to_sockaddr(Ipv4Address::new(0, port));
        let result = unsafe {
            libc::bind(
                socket.fd,
                &raw const addr as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if result == -1 {
            return Err(errno!("failed to bind to port {port}"));
        }

        if unsafe { libc::listen(socket.fd, LISTEN_BACKLOG) } == -1 {
            return Err(errno!("failed to listen on port {port}"));
        }

        Ok(socket)
    }

    /// Accepts one pending connection, returning the client socket (with
    /// `TCP_NODELAY` enabled) and the peer address.
    pub fn accept(&self) -> Result<(Socket, Ipv4Address)> {
        let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut addr_len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

        let fd = unsafe {
            libc::accept(
                self.fd,
                &raw mut addr as *mut libc::sockaddr,
                &raw mut addr_len,
            )
        };
        if fd == -1 {
            return Err(errno!("failed to accept connection"));
        }

        let socket = Socket { fd };
        socket.set_nodelay()?;

        Ok((socket, from_sockaddr(&addr)))
    }

    /// Sends bytes, returning the number actually written.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        let nbytes =
            unsafe { libc::send(self.fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
        if nbytes == -1 {
            return Err(errno!("failed to send data"));
        }
        Ok(nbytes as usize)
    }

    /// Receives up to `buf.len()` bytes.
    ///
    /// `Ok(0)` means the peer performed an orderly shutdown.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let nbytes =
            unsafe { libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if nbytes == -1 {
            return Err(errno!("failed to receive data"));
        }
        Ok(nbytes as usize)
    }

    /// Returns the raw file descriptor for use with [poll_readable].
    ///
    /// The descriptor stays valid until [Socket::close]; a worker is the only
    /// code path that ever closes its endpoint's socket.
    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Closes the socket. Further calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.fd == -1 {
            return Ok(());
        }
        let fd = mem::replace(&mut self.fd, -1);
        if unsafe { libc::close(fd) } == -1 {
            return Err(errno!("failed to close socket"));
        }
        Ok(())
    }

    /// Enables `TCP_NODELAY`.
    pub fn set_nodelay(&self) -> Result<()> {
        if self.set_option(libc::IPPROTO_TCP, libc::TCP_NODELAY, 1) == -1 {
            return Err(errno!("failed to set TCP_NODELAY"));
        }
        Ok(())
    }

    fn set_option(&self, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> libc::c_int {
        unsafe {
            libc::setsockopt(
                self.fd,
                level,
                name,
                &raw const value as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        // Fallback for sockets dropped before a worker owns them; workers
        // close explicitly and report failures.
        let _ = self.close();
    }
}

fn to_sockaddr(addr: Ipv4Address) -> libc::sockaddr_in {
    let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
    sockaddr.sin_family = libc::AF_INET as libc::sa_family_t;
    sockaddr.sin_port = addr.port().to_be();
    sockaddr.sin_addr = libc::in_addr {
        s_addr: addr.host().to_be(),
    };
    sockaddr
}

fn from_sockaddr(sockaddr: &libc::sockaddr_in) -> Ipv4Address {
    Ipv4Address::new(
        u32::from_be(sockaddr.sin_addr.s_addr),
        u16::from_be(sockaddr.sin_port),
    )
}
