//! Network utilities for the mock server.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use tokio::net::TcpListener;

const LISTEN_BACKLOG: i32 = 1024;

/// Resolve `host:port` to the first matching socket address.
pub fn resolve_listen_addr(authority: &str) -> std::io::Result<SocketAddr> {
    authority.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("No address found for {authority}"),
        )
    })
}

/// Create a TCP listener with SO_REUSEADDR so restarts can rebind immediately.
pub fn create_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}
