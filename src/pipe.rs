//! Pipe pair launcher (C4): socket option configuration plus the two
//! unidirectional encrypted byte pumps. Socket-option sequencing is ported
//! from `launchpipes` in the original C relay; the length-prefixed AEAD
//! framing is adapted from the teacher's
//! `send_protocol_message`/`recv_protocol_message` in `net/tcp/utils.rs`,
//! substituting `ChaCha20Poly1305` for the Noise `CipherState` (this core
//! has no message-routing payload, just an opaque byte stream).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use socket2::SockRef;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::crypto::HandshakeKeys;
use crate::state::PipeStatus;

/// 65519 = 65535 (max u16) - 16 (AEAD tag length), so every ciphertext
/// chunk's length prefix still fits in a `u16`.
const MAX_PLAINTEXT_CHUNK: usize = 65519;
const TAG_LEN: usize = 16;

/// Applies `SO_KEEPALIVE` (iff `!nokeepalive`) and `TCP_NODELAY`
/// (unconditionally) to both sockets, best-effort — failures are ignored
/// because the option may be undefined for the socket's family, exactly as
/// the original does for UNIX sockets.
pub fn apply_socket_options(s: &TcpStream, t: &TcpStream, nokeepalive: bool) {
    for stream in [s, t] {
        let sock = SockRef::from(stream);
        if !nokeepalive {
            let _ = sock.set_keepalive(true);
        }
        let _ = stream.set_nodelay(true);
    }
}

pub struct PipePair {
    pub pipe_f: tokio::task::JoinHandle<PipeStatus>,
    pub pipe_r: tokio::task::JoinHandle<PipeStatus>,
}

/// Splits `s` and `t` and spawns the two directional pumps:
/// `pipe_f` reads `s`, writes `t`, using `k_f` with crypto direction
/// `decr`; `pipe_r` reads `t`, writes `s`, using `k_r` with crypto
/// direction `!decr`. Matches spec §4.4 exactly.
///
/// "Crypto direction" here means *decrypts iff true* (the same sense as
/// the connection's own `decr` flag: on the decrypting side, `s` carries
/// ciphertext, so `pipe_f` — which reads `s` — decrypts, while `pipe_r` —
/// which writes `s` — encrypts). `run_pipe` wants an *encrypts* flag, the
/// logical negation.
pub fn launch(s: TcpStream, t: TcpStream, keys: &HandshakeKeys, decr: bool) -> PipePair {
    let (s_read, s_write) = s.into_split();
    let (t_read, t_write) = t.into_split();

    let k_f = keys.k_f;
    let k_r = keys.k_r;

    let pipe_f = tokio::spawn(run_pipe(s_read, t_write, k_f, !decr));
    let pipe_r = tokio::spawn(run_pipe(t_read, s_write, k_r, decr));

    PipePair { pipe_f, pipe_r }
}

/// One direction of the byte pump: if `encrypt` is true this side reads
/// plaintext and writes ciphertext; otherwise it reads ciphertext and
/// writes plaintext. Runs until EOF (clean close) or any I/O/crypto error.
async fn run_pipe(
    mut read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    key: [u8; 32],
    encrypt: bool,
) -> PipeStatus {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

    let result = if encrypt {
        pump_encrypt(&mut read_half, &mut write_half, &cipher).await
    } else {
        pump_decrypt(&mut read_half, &mut write_half, &cipher).await
    };

    match result {
        Ok(()) => PipeStatus::Closed,
        Err(_) => PipeStatus::Error,
    }
}

async fn pump_encrypt(
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
    cipher: &ChaCha20Poly1305,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; MAX_PLAINTEXT_CHUNK];
    let mut seq: u64 = 0;
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let nonce = nonce_for_seq(seq);
        seq += 1;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &buf[..n])
            .map_err(|_| anyhow::anyhow!("encryption failure"))?;
        let len = ciphertext.len() as u16;
        write_half.write_all(&len.to_be_bytes()).await?;
        write_half.write_all(&ciphertext).await?;
        write_half.flush().await?;
    }
}

async fn pump_decrypt(
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
    cipher: &ChaCha20Poly1305,
) -> anyhow::Result<()> {
    let mut seq: u64 = 0;
    loop {
        let mut len_buf = [0u8; 2];
        match read_half.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        if len < TAG_LEN {
            anyhow::bail!("ciphertext frame shorter than tag length");
        }
        let mut chunk = vec![0u8; len];
        read_half.read_exact(&mut chunk).await?;
        let nonce = nonce_for_seq(seq);
        seq += 1;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), chunk.as_ref())
            .map_err(|_| anyhow::anyhow!("decryption/authentication failure"))?;
        write_half.write_all(&plaintext).await?;
        write_half.flush().await?;
    }
}

/// 12-byte ChaCha20-Poly1305 nonce: 4 zero bytes followed by the
/// big-endian 64-bit sequence number. Each direction has its own key, so a
/// per-direction monotonic counter never repeats a (key, nonce) pair for
/// the life of the connection.
fn nonce_for_seq(seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&seq.to_be_bytes());
    nonce
}
