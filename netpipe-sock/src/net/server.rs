//! Passive TCP endpoint: a listener producing accepted connections.

use netpipe_core::endpoint::{EndpointState, StateCell};
use netpipe_core::warn;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::net::TcpConnection;
use crate::sys::{self, Readiness, Socket};

/// Timeout in milliseconds when polling the listening socket for pending
/// connections.
const ACCEPT_POLL_TIMEOUT_MS: libc::c_int = 5;

/// State shared between a server handle and its worker thread.
#[derive(Debug)]
struct Shared {
    state: StateCell,
    socket: Mutex<Socket>,
    pending: Mutex<VecDeque<TcpConnection>>,
}

/// A passive TCP endpoint listening on a local port.
///
/// A dedicated worker thread accepts clients and queues them as ready-to-use
/// [TcpConnection]s (each with its own worker already running) for the
/// caller to pick up with [TcpServer::get_incoming_connection].
///
/// Dropping the server closes it (see [TcpServer::close]).
#[derive(Debug)]
pub struct TcpServer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TcpServer {
    /// Opens a listener on `0.0.0.0:port` (`SO_REUSEADDR` and `TCP_NODELAY`
    /// set, backlog 8).
    ///
    /// Returns `None` if any setup step fails; one warning is logged with
    /// the OS error. On success the server is `OPEN` and its worker is
    /// accepting.
    pub fn create(port: u16) -> Option<TcpServer> {
        match Socket::listen(port) {
            Ok(socket) => Some(TcpServer::from_socket(socket)),
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    fn from_socket(socket: Socket) -> TcpServer {
        let shared = Arc::new(Shared {
            state: StateCell::new(),
            socket: Mutex::new(socket),
            pending: Mutex::new(VecDeque::new()),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || worker(worker_shared));

        TcpServer {
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Dequeues the oldest pending accepted connection, if any.
    ///
    /// Never blocks. Connections are returned in the order they were
    /// accepted.
    pub fn get_incoming_connection(&self) -> Option<TcpConnection> {
        self.shared.pending.lock().unwrap().pop_front()
    }

    /// Returns whether the server is open. Authoritative (locked).
    pub fn is_open(&self) -> bool {
        self.shared.state.is_open()
    }

    /// Returns whether the server looked open at an unlocked glance.
    pub fn may_be_open(&self) -> bool {
        self.shared.state.may_be_open()
    }

    /// Closes every pending connection, requests shutdown, and waits for
    /// the worker to finish.
    ///
    /// Safe to call from any thread and any number of times; also driven by
    /// `Drop`.
    pub fn close(&self) {
        {
            let mut pending = self.shared.pending.lock().unwrap();
            while let Some(connection) = pending.pop_front() {
                connection.close();
            }
        }

        if self.shared.state.is_open() {
            self.shared.state.advance(EndpointState::CLOSING);
        }

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker loop: accepts clients until the server leaves `OPEN`, then closes
/// the listening socket and marks `CLOSED`.
fn worker(shared: Arc<Shared>) {
    let fd = shared.socket.lock().unwrap().raw_fd();

    while shared.state.is_open() {
        match sys::poll_readable(fd, ACCEPT_POLL_TIMEOUT_MS) {
            Ok(Readiness::TimedOut) => continue,
            Ok(Readiness::Readable) => {}
            Err(err) => {
                warn!("{err}");
                shared.state.advance(EndpointState::CLOSING);
                break;
            }
        }

        let accepted = {
            let socket = shared.socket.lock().unwrap();
            socket.accept()
        };

        match accepted {
            Ok((client, remote_ip)) => {
                let connection = TcpConnection::from_socket(client, remote_ip);
                shared.pending.lock().unwrap().push_back(connection);
            }
            Err(err) => {
                warn!("{err}");
                shared.state.advance(EndpointState::CLOSING);
            }
        }
    }

    let mut socket = shared.socket.lock().unwrap();
    if let Err(err) = socket.close() {
        warn!("{err}");
    }
    shared.state.advance(EndpointState::CLOSED);
}
