//! Connection state object (C2). A pure record; all fields have explicit
//! initial values at construction, and the record is only ever destroyed by
//! the orchestrator's drop (see `conn.rs`).
//!
//! `JoinHandle` plays the role of spec.md's "nullable pending-operation
//! handle": `.abort()` is `cancel()`, and a handle is set to `None` the
//! moment its task naturally completes, which is how invariant 1 holds by
//! construction rather than by a runtime check. This mapping is grounded on
//! `Peer.handle: Option<JoinHandle<()>>` in the teacher's `net/types.rs`.

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::addr::Address;
use crate::crypto::HandshakeKeys;
use crate::logging::PrintSender;
use crate::secret::SharedSecret;

/// Per-direction pipe status (spec §3): `1` running, `0` closed cleanly,
/// `-1` errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStatus {
    Running,
    Closed,
    Error,
}

/// Immutable configuration captured at construction (spec §3
/// "Configuration" group).
pub struct ConnConfig {
    pub target_addrs: Vec<Address>,
    pub bind_addr: Option<Address>,
    pub decr: bool,
    pub nopfs: bool,
    pub requirepfs: bool,
    pub nokeepalive: bool,
    pub secret: SharedSecret,
    pub timeout: std::time::Duration,
    pub print_tx: PrintSender,
}

/// One record per active connection. Owned exclusively by its driver task
/// (`conn::drive`) for the connection's whole lifetime; invariant 5 of §5
/// ("confine each connection's state to one thread") holds because no other
/// task ever touches a `ConnState` after `create` hands it to the driver.
pub struct ConnState {
    pub config: ConnConfig,

    /// The already-open side (`s` in spec terms). Always valid until drop.
    pub s: Option<TcpStream>,
    /// The dialed side (`t` in spec terms). `None` until dial succeeds.
    pub t: Option<TcpStream>,

    pub connect_handle: Option<JoinHandle<Option<TcpStream>>>,
    pub connect_timer: Option<JoinHandle<()>>,
    pub handshake_handle:
        Option<JoinHandle<(TcpStream, Result<HandshakeKeys, crate::error::HandshakeError>)>>,
    pub handshake_timer: Option<JoinHandle<()>>,

    pub keys: Option<HandshakeKeys>,

    pub pipe_f: Option<JoinHandle<PipeStatus>>,
    pub pipe_r: Option<JoinHandle<PipeStatus>>,

    pub stat_f: PipeStatus,
    pub stat_r: PipeStatus,
}

impl ConnState {
    pub fn new(s: TcpStream, config: ConnConfig) -> Self {
        Self {
            config,
            s: Some(s),
            t: None,
            connect_handle: None,
            connect_timer: None,
            handshake_handle: None,
            handshake_timer: None,
            keys: None,
            pipe_f: None,
            pipe_r: None,
            stat_f: PipeStatus::Running,
            stat_r: PipeStatus::Running,
        }
    }

    /// Invariant 3: keys are installed as a pair, enforced here by
    /// construction — there is only one `Option<HandshakeKeys>`, not two.
    pub fn has_keys(&self) -> bool {
        self.keys.is_some()
    }

    pub fn dial_settled(&self) -> bool {
        self.t.is_some()
    }

    /// The single predicate used at both call sites that can trigger pipe
    /// launch (spec §9 Open Question O2: one predicate, not two).
    pub fn ready_to_pipe(&self) -> bool {
        self.dial_settled() && self.has_keys() && self.pipe_f.is_none() && self.pipe_r.is_none()
    }

    /// Cancels every still-pending handle. Idempotent: a handle already
    /// taken (`None`) is skipped, matching spec §5's "nulled on settle,
    /// cancelled on drop" discipline.
    pub fn cancel_all_pending(&mut self) {
        if let Some(h) = self.connect_handle.take() {
            h.abort();
        }
        if let Some(h) = self.connect_timer.take() {
            h.abort();
        }
        if let Some(h) = self.handshake_handle.take() {
            h.abort();
        }
        if let Some(h) = self.handshake_timer.take() {
            h.abort();
        }
        if let Some(h) = self.pipe_f.take() {
            h.abort();
        }
        if let Some(h) = self.pipe_r.take() {
            h.abort();
        }
    }
}
