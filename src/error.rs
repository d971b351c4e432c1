//! Structured error types for the parts of the crate that expose a stable,
//! matchable public surface. Internal wiring (dial/handshake plumbing) uses
//! `anyhow` instead, per the teacher's own split between the two.

use thiserror::Error;

/// Why a connection was torn down, surfaced to the upstream death callback
/// exactly once per connection (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ConnectFailed,
    HandshakeFailed,
    Closed,
    Error,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::ConnectFailed => "CONNECT_FAILED",
            DropReason::HandshakeFailed => "HANDSHAKE_FAILED",
            DropReason::Closed => "CLOSED",
            DropReason::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Errors from the address codec (C1).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrCodecError {
    #[error("buffer too short for address header")]
    HeaderTooShort,
    #[error("declared name length does not match remaining buffer")]
    LengthMismatch,
    #[error("unsupported address family tag {0}")]
    UnknownFamily(i32),
}

/// Errors from local setup inside `create` (spec §4.5/§7): these unwind
/// locally and never reach the death callback.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("address list is empty")]
    EmptyAddressList,
}

/// Errors from the handshake protocol (C3's concrete collaborator).
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("peer requested no-PFS while requirepfs is set")]
    PfsRequired,
    #[error("authentication tag mismatch")]
    AuthFailed,
    #[error("handshake i/o error")]
    Io(#[from] std::io::Error),
    #[error("handshake timed out")]
    Timeout,
    #[error("malformed handshake message")]
    Malformed,
}
