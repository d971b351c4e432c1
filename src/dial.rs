//! The non-blocking dial primitive (external collaborator per spec §1/§6):
//! tries a target address list in order, optionally bound to a local
//! address, and resolves to the first successful stream. Grounded on the
//! teacher's `net/connect.rs::connect_to_peer`, which tries TCP direct, then
//! WS direct, then routed, in order — the same "keep trying the list"
//! shape, narrowed here to TCP only (this crate's scope, per DESIGN.md).

use tokio::net::{TcpSocket, TcpStream};

use crate::addr::{Address, AddressFamily};

fn address_to_socket_addr(addr: &Address) -> Option<std::net::SocketAddr> {
    match addr.family {
        AddressFamily::Inet if addr.name.len() >= 6 => {
            let ip = std::net::Ipv4Addr::new(addr.name[0], addr.name[1], addr.name[2], addr.name[3]);
            let port = u16::from_be_bytes([addr.name[4], addr.name[5]]);
            Some(std::net::SocketAddr::new(ip.into(), port))
        }
        AddressFamily::Inet6 if addr.name.len() >= 18 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&addr.name[0..16]);
            let ip = std::net::Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([addr.name[16], addr.name[17]]);
            Some(std::net::SocketAddr::new(ip.into(), port))
        }
        _ => None,
    }
}

/// Tries each address in `targets`, in order, until one connects.
/// Returns `None` if the list is exhausted without success (spec's `t ==
/// -1` case), matching the networker contract's "callback receives the
/// resulting socket descriptor or -1 on failure".
pub async fn dial(targets: &[Address], bind_addr: Option<&Address>) -> Option<TcpStream> {
    for candidate in targets {
        let Some(sock_addr) = address_to_socket_addr(candidate) else {
            continue;
        };
        let socket = match sock_addr {
            std::net::SocketAddr::V4(_) => TcpSocket::new_v4(),
            std::net::SocketAddr::V6(_) => TcpSocket::new_v6(),
        };
        let Ok(socket) = socket else { continue };
        if let Some(bind) = bind_addr {
            if let Some(bind_sock_addr) = address_to_socket_addr(bind) {
                if socket.bind(bind_sock_addr).is_err() {
                    continue;
                }
            }
        }
        if let Ok(stream) = socket.connect(sock_addr).await {
            return Some(stream);
        }
    }
    None
}

/// Resolves hostnames from the CLI/config layer into `Address` values, the
/// "socket-address parsing/resolution utility" external collaborator named
/// in spec §1 (distinct from C1's already-resolved-value codec).
pub async fn resolve(text: &str) -> anyhow::Result<Vec<Address>> {
    let normalized = crate::addr::ensure_port(text);
    if let Some(path) = normalized.strip_prefix('/') {
        return Ok(vec![Address::new(
            AddressFamily::Unix,
            crate::addr::SocketKind::Stream,
            format!("/{path}").into_bytes(),
        )]);
    }
    let resolved = tokio::net::lookup_host(&normalized).await?;
    let mut out = Vec::new();
    for sock_addr in resolved {
        match sock_addr {
            std::net::SocketAddr::V4(v4) => {
                let mut name = v4.ip().octets().to_vec();
                name.extend_from_slice(&v4.port().to_be_bytes());
                out.push(Address::new(
                    AddressFamily::Inet,
                    crate::addr::SocketKind::Stream,
                    name,
                ));
            }
            std::net::SocketAddr::V6(v6) => {
                let mut name = v6.ip().octets().to_vec();
                name.extend_from_slice(&v6.port().to_be_bytes());
                out.push(Address::new(
                    AddressFamily::Inet6,
                    crate::addr::SocketKind::Stream,
                    name,
                ));
            }
        }
    }
    Ok(out)
}
