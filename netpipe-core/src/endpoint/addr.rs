//! IPv4 addressing for TCP endpoints.

use std::fmt;

use crate::error::AddrError;

/// An IPv4 address and port number, both in host byte order.
///
/// Conversion to and from the network-byte-order `sockaddr_in` layout is the
/// job of the OS adapter; this type never holds swapped values.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct Ipv4Address {
    /// IPv4 address as a host-order 32-bit value.
    host: u32,
    /// Port number.
    port: u16,
}

impl Ipv4Address {
    /// Creates an address from a host-order 32-bit IPv4 address and a port.
    pub const fn new(host: u32, port: u16) -> Ipv4Address {
        Ipv4Address { host, port }
    }

    /// Creates an address from dotted-quad octets and a port.
    pub const fn from_octets(octets: [u8; 4], port: u16) -> Ipv4Address {
        Ipv4Address {
            host: u32::from_be_bytes(octets),
            port,
        }
    }

    /// Creates a loopback (`127.0.0.1`) address with the given port.
    pub const fn localhost(port: u16) -> Ipv4Address {
        Ipv4Address::from_octets([127, 0, 0, 1], port)
    }

    /// Returns the host-order 32-bit IPv4 address.
    pub const fn host(&self) -> u32 {
        self.host
    }

    /// Returns the port number.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the address as dotted-quad octets.
    pub const fn octets(&self) -> [u8; 4] {
        self.host.to_be_bytes()
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets = self.octets();
        write!(
            f,
            "{}.{}.{}.{}:{}",
            octets[0], octets[1], octets[2], octets[3], self.port,
        )
    }
}

impl TryFrom<&str> for Ipv4Address {
    type Error = AddrError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let invalid = || AddrError::new(value);

        let mut parts = value.splitn(2, ':');
        let ip = parts.next();
        let port = parts.next();

        match (ip, port) {
            (Some(ip), Some(port)) => {
                let mut octets = [0u8; 4];
                let mut fields = ip.split('.');

                for octet in octets.iter_mut() {
                    *octet = fields
                        .next()
                        .ok_or_else(invalid)?
                        .parse::<u8>()
                        .map_err(|_| invalid())?;
                }

                if fields.next().is_some() {
                    return Err(invalid());
                }

                let port = port.parse::<u16>().map_err(|_| invalid())?;

                Ok(Ipv4Address::from_octets(octets, port))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_octet_round_trip() {
        let addr = Ipv4Address::from_octets([192, 168, 0, 44], 8080);

        assert_eq!(addr.octets(), [192, 168, 0, 44]);
        assert_eq!(addr.port(), 8080);
        assert_eq!(addr.host(), 0xC0A8_002C);
    }

    #[test]
    fn addr_display_dotted_quad() {
        let addr = Ipv4Address::from_octets([10, 0, 0, 1], 80);
        assert_eq!(addr.to_string(), "10.0.0.1:80");

        let addr = Ipv4Address::localhost(19999);
        assert_eq!(addr.to_string(), "127.0.0.1:19999");
    }

    #[test]
    fn addr_parse_valid() {
        let addr = Ipv4Address::try_from("127.0.0.1:6142").unwrap();
        assert_eq!(addr, Ipv4Address::localhost(6142));

        let addr = Ipv4Address::try_from("255.255.255.255:65535").unwrap();
        assert_eq!(addr.octets(), [255, 255, 255, 255]);
        assert_eq!(addr.port(), 65535);
    }

    #[test]
    fn addr_parse_invalid() {
        for input in [
            "",
            "127.0.0.1",
            "127.0.0:80",
            "127.0.0.1.5:80",
            "256.0.0.1:80",
            "a.b.c.d:80",
            "127.0.0.1:port",
            "127.0.0.1:65536",
        ] {
            assert!(
                Ipv4Address::try_from(input).is_err(),
                "parsed {input:?} unexpectedly"
            );
        }
    }
}
