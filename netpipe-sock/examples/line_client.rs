//! A simple client that connects to `127.0.0.1:4242`, sends each line read
//! from `stdin` to the peer, and prints whatever comes back. Type `exit` to
//! close the connection.
//!
//! Start the echo server first:
//!
//!     cargo r --example echo_server
//!
//! And then in another terminal run:
//!
//!     cargo r --example line_client

use netpipe_sock::net::{Ipv4Address, TcpConnection};

use std::io;
use std::thread;
use std::time::Duration;

fn main() -> io::Result<()> {
    let Some(connection) = TcpConnection::connect(Ipv4Address::localhost(4242)) else {
        eprintln!("could not connect to 127.0.0.1:4242");
        return Ok(());
    };

    let mut buf = String::new();

    while connection.is_open() {
        buf.clear();
        io::stdin().read_line(&mut buf)?;
        if buf == "exit\n" {
            break;
        }

        connection.send_string(&buf);

        // Give the echo a moment to make the round trip.
        thread::sleep(Duration::from_millis(50));

        let reply = connection.receive_data();
        if !reply.is_empty() {
            print!("{}", String::from_utf8_lossy(&reply));
        }
    }

    connection.close();

    Ok(())
}
