//! `spiped-rs`: an encrypting/decrypting TCP relay. The binary in
//! `main.rs` is a thin CLI wrapper over this library; splitting the two
//! lets integration tests in `tests/` drive the connection lifecycle (C5)
//! and its collaborators directly against real loopback sockets, per
//! `SPEC_FULL.md` §8's concrete test placement.

pub mod addr;
pub mod config;
pub mod conn;
pub mod crypto;
pub mod dial;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod logging;
pub mod pipe;
pub mod secret;
pub mod state;
