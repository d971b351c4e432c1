//! Handshake driver (C3). Starts a handshake with a bounded timeout,
//! reports success (two key sets) or failure, and is cancellable. Ported
//! from `starthandshake`/`callback_handshake_done`/`callback_handshake_timeout`
//! in the original C relay's connection state machine; the async shape
//! (timer as a sibling task raced against the handshake task) follows the
//! teacher's `connect_with_handshake`/`recv_connection` pattern in
//! `net/tcp/mod.rs`.

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::crypto::{run_handshake, HandshakeKeys};
use crate::error::HandshakeError;
use crate::secret::SharedSecret;

/// Spawns the handshake task. Takes ownership of `socket` for the
/// duration of the handshake and hands it back in the result regardless of
/// outcome, since the caller (C5) still owns the socket afterward — either
/// to pipe over it or to close it on failure.
pub fn spawn(
    mut socket: TcpStream,
    decr: bool,
    nopfs: bool,
    requirepfs: bool,
    secret: SharedSecret,
) -> JoinHandle<(TcpStream, Result<HandshakeKeys, HandshakeError>)> {
    tokio::spawn(async move {
        let result = run_handshake(&mut socket, decr, nopfs, requirepfs, &secret).await;
        (socket, result)
    })
}

/// Spawns the handshake timer. Its completion is itself a natural
/// completion (spec §5: "timeouts are implemented as timers whose firing
/// itself counts as a natural completion"); the caller is responsible for
/// aborting the paired handshake task when this fires.
pub fn spawn_timer(timeout: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
    })
}
