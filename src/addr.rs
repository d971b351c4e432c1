//! Address value and codec (C1). Ported field-for-field from
//! `sock_addr_serialize`/`sock_addr_deserialize`/`sock_addr_prettyprint`/
//! `sock_addr_ensure_port` in the original C relay this crate reimplements,
//! not from any example in the retrieval pack: the wire layout is
//! deliberately host-native (see `serialize`), so there is no serde here.

use crate::error::AddrCodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Unix,
    Inet,
    Inet6,
}

impl AddressFamily {
    fn tag(self) -> i32 {
        match self {
            AddressFamily::Unix => libc::AF_UNIX,
            AddressFamily::Inet => libc::AF_INET,
            AddressFamily::Inet6 => libc::AF_INET6,
        }
    }

    fn from_tag(tag: i32) -> Result<Self, AddrCodecError> {
        if tag == libc::AF_UNIX {
            Ok(AddressFamily::Unix)
        } else if tag == libc::AF_INET {
            Ok(AddressFamily::Inet)
        } else if tag == libc::AF_INET6 {
            Ok(AddressFamily::Inet6)
        } else {
            Err(AddrCodecError::UnknownFamily(tag))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Dgram,
}

impl SocketKind {
    fn tag(self) -> i32 {
        match self {
            SocketKind::Stream => libc::SOCK_STREAM,
            SocketKind::Dgram => libc::SOCK_DGRAM,
        }
    }

    fn from_tag(tag: i32) -> Result<Self, AddrCodecError> {
        if tag == libc::SOCK_STREAM {
            Ok(SocketKind::Stream)
        } else if tag == libc::SOCK_DGRAM {
            Ok(SocketKind::Dgram)
        } else {
            Err(AddrCodecError::UnknownFamily(tag))
        }
    }
}

/// An immutable, already-resolved socket address: family, socket type, and
/// the raw address bytes (a `sockaddr`'s worth of payload for INET/INET6,
/// or the path for UNIX).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub family: AddressFamily,
    pub socket_type: SocketKind,
    pub name: Vec<u8>,
}

impl Address {
    pub fn new(family: AddressFamily, socket_type: SocketKind, name: Vec<u8>) -> Self {
        Self {
            family,
            socket_type,
            name,
        }
    }

    pub fn equal(a: &Address, b: &Address) -> bool {
        a == b
    }

    /// Host-native-width header: `family:i32 | socket_type:i32 | namelen:usize`
    /// followed by the raw name bytes. The integer widths are whatever this
    /// platform's `i32`/`usize` are — this format is for intra-host handoff
    /// only, never for the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 4 + std::mem::size_of::<usize>() + self.name.len());
        buf.extend_from_slice(&self.family.tag().to_ne_bytes());
        buf.extend_from_slice(&self.socket_type.tag().to_ne_bytes());
        buf.extend_from_slice(&self.name.len().to_ne_bytes());
        buf.extend_from_slice(&self.name);
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Address, AddrCodecError> {
        const INT_LEN: usize = 4;
        let usize_len = std::mem::size_of::<usize>();
        let header_len = 2 * INT_LEN + usize_len;
        if buf.len() < header_len {
            return Err(AddrCodecError::HeaderTooShort);
        }
        let family_tag = i32::from_ne_bytes(buf[0..INT_LEN].try_into().unwrap());
        let socktype_tag =
            i32::from_ne_bytes(buf[INT_LEN..2 * INT_LEN].try_into().unwrap());
        let namelen = usize::from_ne_bytes(
            buf[2 * INT_LEN..header_len].try_into().unwrap(),
        );
        if buf.len() != header_len + namelen {
            return Err(AddrCodecError::LengthMismatch);
        }
        Ok(Address {
            family: AddressFamily::from_tag(family_tag)?,
            socket_type: SocketKind::from_tag(socktype_tag)?,
            name: buf[header_len..].to_vec(),
        })
    }

    /// Clones a whole address list. Partial-failure release is free: a
    /// `Vec<Address>` built here either completes or is dropped by the
    /// caller, releasing every element already cloned.
    pub fn clone_list(list: &[Address]) -> Vec<Address> {
        list.to_vec()
    }

    pub fn pretty(&self) -> String {
        match self.family {
            AddressFamily::Inet => pretty_ipv4(&self.name),
            AddressFamily::Inet6 => pretty_ipv6(&self.name),
            AddressFamily::Unix => String::from_utf8_lossy(&self.name).into_owned(),
        }
    }
}

fn pretty_ipv4(name: &[u8]) -> String {
    if name.len() < 6 {
        return "Unknown address".to_string();
    }
    let ip = std::net::Ipv4Addr::new(name[0], name[1], name[2], name[3]);
    let port = u16::from_be_bytes([name[4], name[5]]);
    format!("[{ip}]:{port}")
}

fn pretty_ipv6(name: &[u8]) -> String {
    if name.len() < 18 {
        return "Unknown address".to_string();
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&name[0..16]);
    let ip = std::net::Ipv6Addr::from(octets);
    let port = u16::from_be_bytes([name[16], name[17]]);
    format!("[{ip}]:{port}")
}

/// Lexical "does this already have a port" normalization, ported exactly
/// from the original's structural classification: this is not a parser, it
/// accepts whatever the downstream resolver accepts.
pub fn ensure_port(addr: &str) -> String {
    if addr.starts_with('/') {
        return addr.to_string();
    }
    let colon_count = addr.matches(':').count();
    if colon_count == 0 {
        return format!("{addr}:0");
    }
    if colon_count == 1 {
        return addr.to_string();
    }
    // two or more colons: IPv6
    match addr.find(']') {
        None => format!("[{addr}]:0"),
        Some(idx) if idx == addr.len() - 1 => format!("{addr}:0"),
        Some(_) => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v4() -> Address {
        let mut name = vec![127, 0, 0, 1];
        name.extend_from_slice(&8022u16.to_be_bytes());
        Address::new(AddressFamily::Inet, SocketKind::Stream, name)
    }

    fn sample_unix() -> Address {
        Address::new(
            AddressFamily::Unix,
            SocketKind::Stream,
            b"/tmp/spiped.sock".to_vec(),
        )
    }

    #[test]
    fn round_trips_v4() {
        let a = sample_v4();
        let bytes = a.serialize();
        let b = Address::deserialize(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn round_trips_unix() {
        let a = sample_unix();
        let bytes = a.serialize();
        let b = Address::deserialize(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_wrong_length() {
        let a = sample_v4();
        let mut bytes = a.serialize();
        bytes.push(0xff);
        assert_eq!(
            Address::deserialize(&bytes),
            Err(AddrCodecError::LengthMismatch)
        );
        bytes.truncate(2);
        assert_eq!(
            Address::deserialize(&bytes),
            Err(AddrCodecError::HeaderTooShort)
        );
    }

    #[test]
    fn clone_list_preserves_order_and_length() {
        let list = vec![sample_v4(), sample_unix()];
        let cloned = Address::clone_list(&list);
        assert_eq!(list, cloned);
    }

    #[test]
    fn pretty_print_forms() {
        assert_eq!(sample_v4().pretty(), "[127.0.0.1]:8022");
        assert_eq!(sample_unix().pretty(), "/tmp/spiped.sock");
    }

    #[test]
    fn ensure_port_classifies_correctly() {
        assert_eq!(ensure_port("/tmp/x.sock"), "/tmp/x.sock");
        assert_eq!(ensure_port("example.com"), "example.com:0");
        assert_eq!(ensure_port("example.com:8022"), "example.com:8022");
        assert_eq!(ensure_port("::1"), "[::1]:0");
        assert_eq!(ensure_port("[::1]"), "[::1]:0");
        assert_eq!(ensure_port("[::1]:8022"), "[::1]:8022");
    }

    #[test]
    fn ensure_port_is_idempotent() {
        for input in [
            "/tmp/x.sock",
            "example.com",
            "example.com:8022",
            "::1",
            "[::1]",
            "[::1]:8022",
        ] {
            let once = ensure_port(input);
            let twice = ensure_port(&once);
            assert_eq!(once, twice);
        }
    }
}
