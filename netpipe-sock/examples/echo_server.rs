//! A simple echo server that listens for incoming TCP connections on
//! `0.0.0.0:4242` and echoes back any data received from each client.
//!
//! Start the server with:
//!
//!     cargo r --example echo_server
//!
//! To test it, connect with netcat in another terminal:
//!
//!     nc 127.0.0.1 4242

use netpipe_core::info;
use netpipe_sock::net::{TcpConnection, TcpServer};

use std::thread;
use std::time::Duration;

fn main() {
    let Some(server) = TcpServer::create(4242) else {
        eprintln!("could not open server on port 4242");
        return;
    };

    let mut clients: Vec<TcpConnection> = Vec::new();

    while server.is_open() {
        if let Some(connection) = server.get_incoming_connection() {
            info!("accepted connection from {}", connection.remote_ip());
            clients.push(connection);
        }

        for client in &clients {
            let data = client.receive_data();
            if !data.is_empty() {
                info!("echoing {} bytes to {}", data.len(), client.remote_ip());
                client.send_data(&data);
            }
        }

        // Dropping a closed client joins its worker.
        clients.retain(|client| {
            if client.is_open() {
                true
            } else {
                info!("connection to {} closed", client.remote_ip());
                false
            }
        });

        thread::sleep(Duration::from_millis(10));
    }
}
