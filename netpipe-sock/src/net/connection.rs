//! Active TCP endpoint: a bidirectional byte pipe over one socket.

use netpipe_core::endpoint::{ChunkQueue, EndpointState, Ipv4Address, StateCell};
use netpipe_core::{clock, warn};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::sys::{self, Readiness, Socket};

/// Size of the buffer used for each socket read; one read makes one chunk.
const RECV_BUFFER_SIZE: usize = 4096;

/// Timeout in milliseconds when polling the socket for readability. Bounds
/// how long the worker can stay unaware of a shutdown request.
const POLL_TIMEOUT_MS: libc::c_int = 1;

/// Connection data guarded by one lock: the socket handle and everything
/// that is written while holding it across a syscall.
#[derive(Debug)]
struct ConnData {
    socket: Socket,
    remote_ip: Ipv4Address,
    last_active_time: f32,
}

/// State shared between a connection handle and its worker thread.
#[derive(Debug)]
struct Shared {
    state: StateCell,
    data: Mutex<ConnData>,
    out_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Unlocked hint that `out_queue` has chunks waiting. A stale value is
    /// harmless: the worker reconfirms under the lock before acting.
    out_pending: AtomicBool,
    in_queue: Mutex<ChunkQueue>,
    /// Unlocked hint of the byte count in `in_queue`, mirrored after every
    /// locked mutation.
    in_size: AtomicUsize,
}

/// An active TCP endpoint over exactly one socket, owned for the socket's
/// entire life.
///
/// A dedicated worker thread moves bytes between the socket and two
/// in-memory queues; the methods on this handle only ever touch the queues,
/// so callers never block on I/O. The handle is safe to share between
/// threads.
///
/// Dropping the connection closes it (see [TcpConnection::close]).
#[derive(Debug)]
pub struct TcpConnection {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TcpConnection {
    /// Opens a TCP connection to `remote_ip`, with `TCP_NODELAY` enabled.
    ///
    /// Returns `None` if the socket could not be created or connected; one
    /// warning is logged with the OS error. On success the connection is
    /// `OPEN` and its worker is running.
    pub fn connect(remote_ip: Ipv4Address) -> Option<TcpConnection> {
        match Socket::connect(remote_ip) {
            Ok(socket) => Some(TcpConnection::from_socket(socket, remote_ip)),
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    /// Wraps an already-connected socket and starts the worker.
    ///
    /// Used by [TcpServer](crate::net::TcpServer) for accepted clients.
    pub(crate) fn from_socket(socket: Socket, remote_ip: Ipv4Address) -> TcpConnection {
        let shared = Arc::new(Shared {
            state: StateCell::new(),
            data: Mutex::new(ConnData {
                socket,
                remote_ip,
                last_active_time: 0.0,
            }),
            out_queue: Mutex::new(VecDeque::new()),
            out_pending: AtomicBool::new(false),
            in_queue: Mutex::new(ChunkQueue::new()),
            in_size: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || worker(worker_shared));

        TcpConnection {
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Returns the address of the remote peer. Never changes.
    pub fn remote_ip(&self) -> Ipv4Address {
        self.shared.data.lock().unwrap().remote_ip
    }

    /// Returns the monotonic timestamp, in seconds, of the last successful
    /// send or receive on the socket.
    pub fn last_active_time(&self) -> f32 {
        self.shared.data.lock().unwrap().last_active_time
    }

    /// Queues `data` for transmission as one chunk.
    ///
    /// Returns `false` without queuing anything if the connection is not
    /// open. Chunks are transmitted in FIFO order, each in a single write
    /// attempt.
    pub fn send_data(&self, data: &[u8]) -> bool {
        if !self.is_open() {
            return false;
        }

        let mut queue = self.shared.out_queue.lock().unwrap();
        queue.push_back(data.to_vec());
        self.shared.out_pending.store(true, Ordering::Relaxed);

        true
    }

    /// Queues the UTF-8 bytes of `s` for transmission as one chunk.
    pub fn send_string(&self, s: &str) -> bool {
        self.send_data(s.as_bytes())
    }

    /// Drains everything received so far into one contiguous buffer.
    ///
    /// Returns an empty buffer if nothing is pending.
    pub fn receive_data(&self) -> Vec<u8> {
        if self.shared.in_size.load(Ordering::Relaxed) == 0 {
            return Vec::new();
        }

        let mut queue = self.shared.in_queue.lock().unwrap();
        let data = queue.take_all();
        self.shared.in_size.store(queue.size(), Ordering::Relaxed);

        data
    }

    /// Extracts exactly `num_bytes` received bytes in FIFO order.
    ///
    /// Returns an empty buffer, leaving the queue untouched, if fewer than
    /// `num_bytes` bytes are currently buffered. The size check and the
    /// extraction happen under one lock acquisition, so the result is
    /// all-or-nothing even with the worker appending concurrently.
    pub fn receive_exact(&self, num_bytes: usize) -> Vec<u8> {
        if self.shared.in_size.load(Ordering::Relaxed) < num_bytes {
            return Vec::new();
        }

        let mut queue = self.shared.in_queue.lock().unwrap();
        let data = queue.extract(num_bytes);
        self.shared.in_size.store(queue.size(), Ordering::Relaxed);

        data
    }

    /// Returns the number of received bytes currently buffered, read under
    /// the in-queue lock.
    pub fn available_bytes(&self) -> usize {
        self.shared.in_queue.lock().unwrap().size()
    }

    /// Extracts received bytes up to and including the first occurrence of
    /// `delimiter`, converted lossily to a string.
    ///
    /// Returns an empty string, leaving the queue untouched, if the
    /// delimiter has not arrived yet.
    pub fn receive_string(&self, delimiter: u8) -> String {
        if self.shared.in_size.load(Ordering::Relaxed) == 0 {
            return String::new();
        }

        let mut queue = self.shared.in_queue.lock().unwrap();
        let Some(pos) = queue.position_of(delimiter) else {
            return String::new();
        };
        let data = queue.extract(pos + 1);
        self.shared.in_size.store(queue.size(), Ordering::Relaxed);

        String::from_utf8_lossy(&data).into_owned()
    }

    /// Returns whether the connection is open. Authoritative (locked).
    pub fn is_open(&self) -> bool {
        self.shared.state.is_open()
    }

    /// Returns whether the connection looked open at an unlocked glance.
    pub fn may_be_open(&self) -> bool {
        self.shared.state.may_be_open()
    }

    /// Requests shutdown and waits for the worker to finish.
    ///
    /// Queued outbound chunks that were not yet written are discarded. Safe
    /// to call from any thread and any number of times; also driven by
    /// `Drop`.
    pub fn close(&self) {
        if self.shared.state.is_open() {
            self.shared.state.advance(EndpointState::CLOSING);
        }

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Worker loop: pumps bytes between the socket and the queues until the
/// connection leaves `OPEN`, then closes the socket and marks `CLOSED`.
fn worker(shared: Arc<Shared>) {
    let mut buffer = [0u8; RECV_BUFFER_SIZE];

    // The descriptor is cached for polling; it stays valid because this
    // worker is the only code path that closes the socket.
    let fd = {
        let mut data = shared.data.lock().unwrap();
        data.last_active_time = clock::now();
        data.socket.raw_fd()
    };

    while shared.state.is_open() {
        drain_outbound(&shared);
        drain_inbound(&shared, fd, &mut buffer);
    }

    let mut data = shared.data.lock().unwrap();
    if let Err(err) = data.socket.close() {
        warn!("{err}");
    }
    shared.state.advance(EndpointState::CLOSED);
}

/// Writes queued chunks to the socket, oldest first.
///
/// Each chunk gets a single write attempt; a short write is fatal for the
/// connection and leaves the chunk at the head of the queue.
fn drain_outbound(shared: &Shared) {
    if !shared.out_pending.load(Ordering::Relaxed) {
        return;
    }

    let data = shared.data.lock().unwrap();
    let mut queue = shared.out_queue.lock().unwrap();

    while let Some(chunk) = queue.front() {
        match data.socket.send(chunk) {
            Ok(nbytes) if nbytes == chunk.len() => {
                queue.pop_front();
            }
            Ok(nbytes) => {
                warn!("short write ({nbytes} of {} bytes); closing connection", chunk.len());
                shared.state.advance(EndpointState::CLOSING);
                break;
            }
            Err(err) => {
                warn!("{err}");
                shared.state.advance(EndpointState::CLOSING);
                break;
            }
        }
    }

    shared.out_pending.store(!queue.is_empty(), Ordering::Relaxed);
}

/// Reads from the socket for as long as it stays readable within the poll
/// timeout, appending one chunk per read.
fn drain_inbound(shared: &Shared, fd: std::os::unix::io::RawFd, buffer: &mut [u8]) {
    loop {
        if !shared.state.is_open() {
            break;
        }

        match sys::poll_readable(fd, POLL_TIMEOUT_MS) {
            // Nothing to read this tick; give the outbound side a turn.
            Ok(Readiness::TimedOut) => break,
            Ok(Readiness::Readable) => {}
            Err(err) => {
                warn!("{err}");
                shared.state.advance(EndpointState::CLOSING);
                break;
            }
        }

        let mut data = shared.data.lock().unwrap();
        let received = match data.socket.recv(buffer) {
            Ok(0) => {
                // Peer has shut down.
                shared.state.advance(EndpointState::CLOSING);
                break;
            }
            Ok(nbytes) => nbytes,
            Err(err) => {
                warn!("{err}");
                shared.state.advance(EndpointState::CLOSING);
                break;
            }
        };
        data.last_active_time = clock::now();
        drop(data);

        let mut queue = shared.in_queue.lock().unwrap();
        queue.push(buffer[..received].to_vec());
        shared.in_size.store(queue.size(), Ordering::Relaxed);
    }
}
