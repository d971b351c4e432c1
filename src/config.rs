//! CLI/config layer (external collaborator per spec.md §1/§6). Parsed with
//! `clap`'s derive API, grounded on the teacher's `main.rs` CLI (which
//! reaches for `clap::{arg, value_parser, Command}` to parse a flat set of
//! process-level flags) but restyled as a `#[derive(Parser)]` struct, since
//! this crate's flag set is small enough that the derive form is the
//! idiomatic fit rather than the teacher's builder form.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::addr;

/// `spiped-rs` — an encrypting/decrypting TCP relay.
///
/// One side of the relay carries ciphertext (selected with `-d` if this
/// process is the decrypting side, or left unset if it is the encrypting
/// side); the other side carries plaintext. Exactly one of `-d`/`-e` must be
/// given.
#[derive(Parser, Debug)]
#[command(name = "spiped-rs", version, about)]
pub struct Cli {
    /// This process decrypts incoming traffic on `--source` (the ciphertext
    /// side) and forwards plaintext to `--target`.
    #[arg(short = 'd', conflicts_with = "encrypt")]
    pub decrypt: bool,

    /// This process encrypts plaintext arriving on `--source` and forwards
    /// ciphertext to `--target` (the ciphertext side).
    #[arg(short = 'e', conflicts_with = "decrypt")]
    pub encrypt: bool,

    /// Address to listen on (accepts connections here).
    #[arg(short = 's', long = "source", value_name = "ADDR")]
    pub source: String,

    /// Address to connect out to for each accepted connection.
    #[arg(short = 't', long = "target", value_name = "ADDR")]
    pub target: String,

    /// Path to the shared-secret key file.
    #[arg(short = 'k', long = "keyfile", value_name = "PATH")]
    pub keyfile: PathBuf,

    /// Disable ephemeral Diffie-Hellman (no forward secrecy).
    #[arg(long = "nopfs")]
    pub nopfs: bool,

    /// Abort the handshake if the peer requests to disable forward secrecy.
    #[arg(long = "requirepfs", conflicts_with = "nopfs")]
    pub requirepfs: bool,

    /// Disable SO_KEEPALIVE on both sockets of a connection.
    #[arg(long = "nokeepalive")]
    pub nokeepalive: bool,

    /// Per-connection dial/handshake timeout, in seconds.
    #[arg(short = 'T', long = "timeout", value_name = "SECS", default_value_t = 5.0)]
    pub timeout_secs: f64,

    /// Increase output verbosity; may be repeated (-v, -vv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

/// Resolved, validated configuration ready to drive the listener.
pub struct Config {
    pub decr: bool,
    pub source: String,
    pub target: String,
    pub keyfile: PathBuf,
    pub nopfs: bool,
    pub requirepfs: bool,
    pub nokeepalive: bool,
    pub timeout: Duration,
    pub verbosity: u8,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<Config> {
        if self.decrypt == self.encrypt {
            anyhow::bail!("exactly one of -d or -e must be given");
        }
        if self.timeout_secs <= 0.0 {
            anyhow::bail!("--timeout must be positive");
        }
        Ok(Config {
            decr: self.decrypt,
            source: addr::ensure_port(&self.source),
            target: addr::ensure_port(&self.target),
            keyfile: self.keyfile,
            nopfs: self.nopfs,
            requirepfs: self.requirepfs,
            nokeepalive: self.nokeepalive,
            timeout: Duration::from_secs_f64(self.timeout_secs),
            verbosity: self.verbosity,
        })
    }
}
