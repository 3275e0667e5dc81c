use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::TcpListener;

/// Bind a non-blocking listener to the configured endpoint. An empty host
/// or `0.0.0.0` binds the wildcard address; anything else must be a
/// dotted-quad IPv4 address. Port 0 asks the kernel for an ephemeral port.
pub fn bind_listener(host: &str, port: u16) -> io::Result<TcpListener> {
    let ip = if host.is_empty() || host == "0.0.0.0" {
        Ipv4Addr::UNSPECIFIED
    } else {
        host.parse::<Ipv4Addr>().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid listen host '{host}'"),
            )
        })?
    };

    TcpListener::bind(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_loopback_with_ephemeral_port() {
        let listener = bind_listener("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn empty_host_means_wildcard() {
        let listener = bind_listener("", 0).unwrap();
        assert_eq!(listener.local_addr().unwrap().ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn rejects_malformed_hosts() {
        assert!(bind_listener("999.1.1.1", 0).is_err());
        assert!(bind_listener("not-an-ip", 0).is_err());
    }
}
