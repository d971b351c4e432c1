//! The concrete handshake protocol: the cryptographic primitive that C3
//! drives. Built from X25519 + HKDF + HMAC rather than the teacher's
//! Noise/snow stack, because a PSK-only handshake with a runtime
//! `nopfs`/`requirepfs` toggle does not fit a fixed Noise pattern assuming
//! per-node static identities (see DESIGN.md).

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::RngCore;
use sha2::Sha256;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroize;

use crate::error::HandshakeError;
use crate::secret::SharedSecret;

const NONCE_LEN: usize = 32;
const PUBKEY_LEN: usize = 32;
const MAC_LEN: usize = 32;

/// Two independent 32-byte symmetric keys: one for the forward direction,
/// one for the reverse. Both peers of a connection derive the identical
/// pair (see DESIGN.md: this is not TLS-style per-side traffic secrets).
#[derive(Clone)]
pub struct HandshakeKeys {
    pub k_f: [u8; 32],
    pub k_r: [u8; 32],
}

impl std::fmt::Debug for HandshakeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HandshakeKeys(..)")
    }
}

struct Hello {
    wants_pfs: bool,
    ephemeral_pub: Option<[u8; PUBKEY_LEN]>,
    nonce: [u8; NONCE_LEN],
}

impl Hello {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + PUBKEY_LEN + NONCE_LEN);
        out.push(if self.wants_pfs { 1 } else { 0 });
        if let Some(pk) = &self.ephemeral_pub {
            out.extend_from_slice(pk);
        }
        out.extend_from_slice(&self.nonce);
        out
    }

    fn decode(buf: &[u8]) -> Result<Self, HandshakeError> {
        if buf.is_empty() {
            return Err(HandshakeError::Malformed);
        }
        let wants_pfs = buf[0] != 0;
        let expected_len = 1 + NONCE_LEN + if wants_pfs { PUBKEY_LEN } else { 0 };
        if buf.len() != expected_len {
            return Err(HandshakeError::Malformed);
        }
        let (ephemeral_pub, nonce_start) = if wants_pfs {
            let mut pk = [0u8; PUBKEY_LEN];
            pk.copy_from_slice(&buf[1..1 + PUBKEY_LEN]);
            (Some(pk), 1 + PUBKEY_LEN)
        } else {
            (None, 1)
        };
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[nonce_start..nonce_start + NONCE_LEN]);
        Ok(Hello {
            wants_pfs,
            ephemeral_pub,
            nonce,
        })
    }
}

/// Runs the handshake to completion over `stream`. `decr` selects which
/// side of the pair this peer is on only insofar as it picks who sends
/// first, to avoid both sides blocking on a synchronous read; the protocol
/// itself is symmetric.
pub async fn run_handshake<S>(
    stream: &mut S,
    decr: bool,
    nopfs: bool,
    requirepfs: bool,
    secret: &SharedSecret,
) -> Result<HandshakeKeys, HandshakeError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let wants_pfs = !nopfs;
    let mut csprng = rand::rngs::OsRng;

    let ephemeral_secret = wants_pfs.then(|| EphemeralSecret::random_from_rng(&mut csprng));
    let ephemeral_pub = ephemeral_secret
        .as_ref()
        .map(|s| *PublicKey::from(s).as_bytes());

    let mut nonce = [0u8; NONCE_LEN];
    csprng.fill_bytes(&mut nonce);

    let our_hello = Hello {
        wants_pfs,
        ephemeral_pub,
        nonce,
    };
    let our_hello_bytes = our_hello.encode();
    let our_tag = hmac_tag(secret, &our_hello_bytes);

    // Decr side writes first so encr side (which only starts the
    // handshake once its dial completes) never double-initiates.
    if decr {
        write_frame(stream, &our_hello_bytes).await?;
        write_frame(stream, &our_tag).await?;
    }

    let their_hello_bytes = read_frame(stream).await?;
    let their_tag = read_frame(stream).await?;

    if !decr {
        write_frame(stream, &our_hello_bytes).await?;
        write_frame(stream, &our_tag).await?;
    }

    let mut verifier =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    verifier.update(&their_hello_bytes);
    verifier
        .verify_slice(&their_tag)
        .map_err(|_| HandshakeError::AuthFailed)?;

    let their_hello = Hello::decode(&their_hello_bytes)?;

    if requirepfs && !their_hello.wants_pfs {
        return Err(HandshakeError::PfsRequired);
    }

    let mut dh_output = match (ephemeral_secret, their_hello.ephemeral_pub) {
        (Some(secret), Some(their_pub)) => {
            let shared = secret.diffie_hellman(&PublicKey::from(their_pub));
            shared.as_bytes().to_vec()
        }
        _ => Vec::new(),
    };

    let mut ikm = secret.as_bytes().to_vec();
    ikm.extend_from_slice(&dh_output);
    dh_output.zeroize();

    // Order-independent so both peers land on the same salt regardless of
    // which one is `decr`.
    let (lo, hi) = if our_hello.nonce <= their_hello.nonce {
        (our_hello.nonce, their_hello.nonce)
    } else {
        (their_hello.nonce, our_hello.nonce)
    };
    let mut salt = Vec::with_capacity(2 * NONCE_LEN);
    salt.extend_from_slice(&lo);
    salt.extend_from_slice(&hi);

    let hk = Hkdf::<Sha256>::new(Some(&salt), &ikm);
    ikm.zeroize();

    let mut k_f = [0u8; 32];
    let mut k_r = [0u8; 32];
    hk.expand(b"spiped-rs forward", &mut k_f)
        .map_err(|_| HandshakeError::Malformed)?;
    hk.expand(b"spiped-rs reverse", &mut k_r)
        .map_err(|_| HandshakeError::Malformed)?;

    Ok(HandshakeKeys { k_f, k_r })
}

fn hmac_tag(secret: &SharedSecret, message: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> Result<(), HandshakeError>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let len = payload.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>, HandshakeError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
