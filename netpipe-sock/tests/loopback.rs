//! End-to-end tests for the TCP endpoints over the loopback interface.
//!
//! Each test runs its own server on a dedicated port so the tests can run in
//! parallel. Timing-dependent checks poll with a bounded deadline instead of
//! relying on fixed sleeps.

use netpipe_sock::net::{Ipv4Address, TcpConnection, TcpServer};

use std::thread;
use std::time::{Duration, Instant};

/// Polls `cond` until it returns true or `timeout` elapses.
fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Dequeues the next accepted connection, waiting up to `timeout`.
fn accept_one(server: &TcpServer, timeout: Duration) -> Option<TcpConnection> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(connection) = server.get_incoming_connection() {
            return Some(connection);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Opens a server and a client connected to it, returning both ends of the
/// pipe.
fn connected_pair(port: u16) -> (TcpServer, TcpConnection, TcpConnection) {
    let server = TcpServer::create(port).expect("failed to create server");
    let client =
        TcpConnection::connect(Ipv4Address::localhost(port)).expect("failed to connect client");
    let accepted = accept_one(&server, Duration::from_secs(1)).expect("no incoming connection");
    (server, client, accepted)
}

/// Drains `connection` until `expected` bytes have been collected or the
/// deadline passes.
fn receive_total(connection: &TcpConnection, expected: usize, timeout: Duration) -> Vec<u8> {
    let mut collected = Vec::new();
    let deadline = Instant::now() + timeout;
    while collected.len() < expected && Instant::now() < deadline {
        let data = connection.receive_data();
        if data.is_empty() {
            thread::sleep(Duration::from_millis(5));
        } else {
            collected.extend(data);
        }
    }
    collected
}

#[test]
fn echo_over_loopback() {
    let (_server, client, accepted) = connected_pair(19990);

    assert!(client.is_open());
    assert!(client.may_be_open());
    assert!(accepted.is_open());
    assert_eq!(accepted.remote_ip().octets(), [127, 0, 0, 1]);
    assert_eq!(client.remote_ip(), Ipv4Address::localhost(19990));

    assert!(client.send_data(&[0x01, 0x02, 0x03, 0x04]));

    assert!(wait_until(Duration::from_secs(1), || {
        accepted.available_bytes() >= 4
    }));
    assert_eq!(accepted.receive_data(), [0x01, 0x02, 0x03, 0x04]);

    // Nothing further arrives.
    assert_eq!(accepted.available_bytes(), 0);
    assert!(accepted.receive_data().is_empty());
}

#[test]
fn partial_extraction() {
    let (_server, client, accepted) = connected_pair(19991);

    assert!(client.send_data(&[0x01, 0x02, 0x03, 0x04]));
    assert!(wait_until(Duration::from_secs(1), || {
        accepted.available_bytes() >= 4
    }));

    // Asking for more than is buffered consumes nothing.
    assert!(accepted.receive_exact(5).is_empty());
    assert_eq!(accepted.available_bytes(), 4);

    assert_eq!(accepted.receive_exact(2), [0x01, 0x02]);
    assert_eq!(accepted.receive_exact(2), [0x03, 0x04]);
    assert!(accepted.receive_exact(1).is_empty());
    assert_eq!(accepted.available_bytes(), 0);
}

#[test]
fn string_delimiter() {
    let (_server, client, accepted) = connected_pair(19992);

    assert!(client.send_data(b"hello\0world\0"));
    assert!(wait_until(Duration::from_secs(1), || {
        accepted.available_bytes() >= 12
    }));

    // A delimiter that never arrives consumes nothing.
    assert_eq!(accepted.receive_string(b'x'), "");
    assert_eq!(accepted.available_bytes(), 12);

    assert_eq!(accepted.receive_string(0), "hello\0");
    assert_eq!(accepted.receive_string(0), "world\0");
    assert_eq!(accepted.receive_string(0), "");
    assert_eq!(accepted.available_bytes(), 0);
}

#[test]
fn orderly_peer_close() {
    let (_server, client, accepted) = connected_pair(19993);

    client.close();
    assert!(!client.is_open());

    assert!(wait_until(Duration::from_secs(1), || !accepted.is_open()));
    assert!(!accepted.may_be_open());
}

#[test]
fn send_after_close_rejected() {
    let (_server, client, accepted) = connected_pair(19994);

    assert!(client.send_data(&[0x01, 0x02, 0x03, 0x04]));
    let data = receive_total(&accepted, 4, Duration::from_secs(1));
    assert_eq!(data, [0x01, 0x02, 0x03, 0x04]);

    client.close();
    assert!(!client.send_data(&[0x05]));
    assert!(!client.send_string("more"));

    // The peer never sees anything beyond the first payload.
    thread::sleep(Duration::from_millis(200));
    assert!(accepted.receive_data().is_empty());
}

#[test]
fn server_port_reuse() {
    let server = TcpServer::create(19995).expect("failed to create first server");
    assert!(server.is_open());
    server.close();
    assert!(!server.is_open());

    let server = TcpServer::create(19995).expect("failed to recreate server on same port");
    assert!(server.is_open());
}

#[test]
fn fifo_lossless_delivery() {
    let (_server, client, accepted) = connected_pair(19996);

    // Chunks of varying sizes; the concatenation must arrive byte-exact and
    // in order regardless of how the worker's reads slice it.
    let mut expected = Vec::new();
    for i in 0u8..50 {
        let chunk = vec![i; usize::from(i % 7) + 1];
        expected.extend_from_slice(&chunk);
        assert!(client.send_data(&chunk));
    }

    let received = receive_total(&accepted, expected.len(), Duration::from_secs(2));
    assert_eq!(received, expected);

    // And the reverse direction over the same socket.
    let mut reply = Vec::new();
    for chunk in expected.chunks(13) {
        reply.extend_from_slice(chunk);
        assert!(accepted.send_data(chunk));
    }
    let received = receive_total(&client, reply.len(), Duration::from_secs(2));
    assert_eq!(received, reply);
}

#[test]
fn pending_connections_are_fifo() {
    let server = TcpServer::create(19997).expect("failed to create server");

    // connect(2) returns once the handshake completes, so sequential
    // connects land in the accept queue in this order.
    let mut clients = Vec::new();
    for marker in [0x0Au8, 0x0B, 0x0C] {
        let client = TcpConnection::connect(Ipv4Address::localhost(19997))
            .expect("failed to connect client");
        assert!(client.send_data(&[marker]));
        clients.push(client);
    }

    for expected in [0x0Au8, 0x0B, 0x0C] {
        let accepted =
            accept_one(&server, Duration::from_secs(1)).expect("missing accepted connection");
        let marker = receive_total(&accepted, 1, Duration::from_secs(1));
        assert_eq!(marker, [expected]);
    }
}

#[test]
fn connect_to_closed_port_fails() {
    // Nothing listens on this port; the factory reports failure as None.
    assert!(TcpConnection::connect(Ipv4Address::localhost(19899)).is_none());
}

#[test]
fn last_active_time_tracks_traffic() {
    let (_server, client, accepted) = connected_pair(19989);

    assert!(client.send_data(&[0x00]));
    assert_eq!(receive_total(&accepted, 1, Duration::from_secs(1)), [0x00]);
    let before = accepted.last_active_time();

    thread::sleep(Duration::from_millis(60));
    assert!(client.send_data(&[0xFF]));
    let data = receive_total(&accepted, 1, Duration::from_secs(1));
    assert_eq!(data, [0xFF]);

    assert!(accepted.last_active_time() > before);
}

#[test]
fn close_is_idempotent() {
    let (server, client, accepted) = connected_pair(19988);

    client.close();
    client.close();
    assert!(!client.is_open());

    accepted.close();
    accepted.close();

    server.close();
    server.close();
    assert!(!server.is_open());
    assert!(server.get_incoming_connection().is_none());
}

#[test]
fn server_close_closes_pending_connections() {
    let server = TcpServer::create(19987).expect("failed to create server");

    let client =
        TcpConnection::connect(Ipv4Address::localhost(19987)).expect("failed to connect client");

    // Give the worker time to accept and queue the connection, then close
    // the server; the pending side is closed for us.
    assert!(client.is_open());
    thread::sleep(Duration::from_millis(200));
    server.close();

    assert!(wait_until(Duration::from_secs(1), || !client.is_open()));
    assert!(server.get_incoming_connection().is_none());
}
