//! Lifecycle orchestrator (C5). Owns the per-connection state machine:
//! launches dial + handshake in parallel, joins them, launches pipes, and
//! drops on any terminal event, enforcing exactly-once teardown. Ported
//! from `proto_conn_create`/`proto_conn_drop`/the `callback_*` family in
//! the original C relay's `lib/proto/proto_conn.c`; realized here as a
//! single driver task per connection per spec §9 Design Notes option (b)
//! — "a cooperative task per connection that awaits dial/handshake/pipe
//! futures and composes them with a timeout combinator".

use tokio::net::TcpStream;

use crate::addr::Address;
use crate::error::{CreateError, DropReason};
use crate::handshake;
use crate::logging::{print_debug, print_loud, PrintSender};
use crate::pipe;
use crate::secret::SharedSecret;
use crate::state::{ConnConfig, ConnState, PipeStatus};

/// Callback invoked exactly once per connection, from inside `drop_conn`
/// (spec §3 invariant 7 / §6 upstream contract).
pub trait OnDead: Send + 'static {
    fn on_dead(self: Box<Self>, reason: DropReason);
}

impl<F: FnOnce(DropReason) + Send + 'static> OnDead for F {
    fn on_dead(self: Box<Self>, reason: DropReason) {
        (*self)(reason)
    }
}

pub struct CreateParams {
    pub s: TcpStream,
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

/// Constructs the connection state and spawns its driver task. Setup
/// failures (e.g. an empty address list) unwind locally and never invoke
/// `on_dead` — spec §7's "do not invoke on_dead" for pre-visible failures.
pub fn create(
    params: CreateParams,
    on_dead: impl OnDead,
) -> Result<tokio::task::JoinHandle<()>, CreateError> {
    if params.target_addrs.is_empty() {
        return Err(CreateError::EmptyAddressList);
    }

    let config = ConnConfig {
        target_addrs: params.target_addrs,
        bind_addr: params.bind_addr,
        decr: params.decr,
        nopfs: params.nopfs,
        requirepfs: params.requirepfs,
        nokeepalive: params.nokeepalive,
        secret: params.secret,
        timeout: params.timeout,
        print_tx: params.print_tx,
    };
    let mut state = ConnState::new(params.s, config);

    // Dial, always started.
    let targets = state.config.target_addrs.clone();
    let bind_addr = state.config.bind_addr.clone();
    state.connect_handle = Some(tokio::spawn(async move {
        crate::dial::dial(&targets, bind_addr.as_ref()).await
    }));
    state.connect_timer = Some(tokio::spawn(tokio::time::sleep(state.config.timeout)));

    // On the decrypting side, the handshake starts on `s` immediately,
    // concurrently with the dial (spec §4.5's "rationale for decr-side
    // early start").
    if state.config.decr {
        let s = state.s.take().expect("s is always present at construction");
        state.handshake_handle = Some(handshake::spawn(
            s,
            state.config.decr,
            state.config.nopfs,
            state.config.requirepfs,
            state.config.secret.clone(),
        ));
        state.handshake_timer = Some(handshake::spawn_timer(state.config.timeout));
    }

    let driver = tokio::spawn(drive(state, Box::new(on_dead)));
    Ok(driver)
}

/// The single task that owns `state` end to end. `tokio::select!`s over
/// whichever handles are currently live, mutating `state` exactly as the
/// spec's callbacks describe, until a terminal condition is reached, then
/// calls `drop_conn` exactly once.
async fn drive(mut state: ConnState, on_dead: Box<dyn OnDead>) {
    let reason = loop {
        tokio::select! {
            biased;

            res = wait_opt(&mut state.connect_handle) => {
                if let Some(reason) = on_connect_done(&mut state, res).await {
                    break reason;
                }
            }
            _ = wait_opt(&mut state.connect_timer) => {
                state.connect_timer = None;
                break DropReason::Error;
            }
            res = wait_opt(&mut state.handshake_handle) => {
                if let Some(reason) = on_handshake_done(&mut state, res).await {
                    break reason;
                }
            }
            _ = wait_opt(&mut state.handshake_timer) => {
                state.handshake_timer = None;
                break DropReason::Error;
            }
            res = wait_opt(&mut state.pipe_f) => {
                if let Some(reason) = on_pipe_status(&mut state, true, res) {
                    break reason;
                }
            }
            res = wait_opt(&mut state.pipe_r) => {
                if let Some(reason) = on_pipe_status(&mut state, false, res) {
                    break reason;
                }
            }
        }
    };

    drop_conn(state, reason, on_dead).await;
}

/// Awaits a handle if present, otherwise never resolves — lets
/// `tokio::select!` skip branches whose operation isn't currently pending,
/// matching spec §3's "nullable pending-operation handle".
async fn wait_opt<T>(handle: &mut Option<tokio::task::JoinHandle<T>>) -> Result<T, tokio::task::JoinError> {
    match handle {
        Some(h) => h.await,
        None => std::future::pending().await,
    }
}

/// Dial completion (spec §4.5 `on_connect_done`). Returns `Some(reason)`
/// if this turn decides the connection must die.
async fn on_connect_done(
    state: &mut ConnState,
    res: Result<Option<TcpStream>, tokio::task::JoinError>,
) -> Option<DropReason> {
    state.connect_handle = None;
    if let Some(timer) = state.connect_timer.take() {
        timer.abort();
    }

    let stream = match res {
        Ok(Some(stream)) => stream,
        Ok(None) => return Some(DropReason::ConnectFailed),
        Err(_) => return Some(DropReason::Error),
    };
    state.t = Some(stream);

    if !state.config.decr {
        let t = state.t.take().expect("just set");
        state.handshake_handle = Some(handshake::spawn(
            t,
            state.config.decr,
            state.config.nopfs,
            state.config.requirepfs,
            state.config.secret.clone(),
        ));
        state.handshake_timer = Some(handshake::spawn_timer(state.config.timeout));
        return None;
    }

    if state.ready_to_pipe() {
        return try_launch_pipes(state);
    }
    None
}

/// Handshake completion (spec §4.3). Returns `Some(reason)` if this turn
/// decides the connection must die.
async fn on_handshake_done(
    state: &mut ConnState,
    res: Result<
        (TcpStream, Result<crate::crypto::HandshakeKeys, crate::error::HandshakeError>),
        tokio::task::JoinError,
    >,
) -> Option<DropReason> {
    state.handshake_handle = None;
    if let Some(timer) = state.handshake_timer.take() {
        timer.abort();
    }

    let (stream, result) = match res {
        Ok(pair) => pair,
        Err(_) => return Some(DropReason::Error),
    };

    // put the socket back where it belongs: on the decr side the
    // handshake ran on `s`, on the encr side it ran on `t`.
    if state.config.decr {
        state.s = Some(stream);
    } else {
        state.t = Some(stream);
    }

    match result {
        Err(_) => Some(DropReason::HandshakeFailed),
        Ok(keys) => {
            state.keys = Some(keys);
            if state.ready_to_pipe() {
                try_launch_pipes(state)
            } else {
                None
            }
        }
    }
}

fn try_launch_pipes(state: &mut ConnState) -> Option<DropReason> {
    let (Some(s), Some(t)) = (state.s.take(), state.t.take()) else {
        return Some(DropReason::Error);
    };
    let Some(keys) = state.keys.clone() else {
        return Some(DropReason::Error);
    };

    pipe::apply_socket_options(&s, &t, state.config.nokeepalive);
    let pair = pipe::launch(s, t, &keys, state.config.decr);
    state.pipe_f = Some(pair.pipe_f);
    state.pipe_r = Some(pair.pipe_r);
    None
}

/// Pipe status change (spec §4.4's status callback policy): any `-1`
/// (error) drops with `ERROR`; both `0` (closed) drops with `CLOSED`;
/// otherwise noop — one direction half-closed, the other still live.
fn on_pipe_status(
    state: &mut ConnState,
    is_forward: bool,
    res: Result<PipeStatus, tokio::task::JoinError>,
) -> Option<DropReason> {
    let status = res.unwrap_or(PipeStatus::Error);
    if is_forward {
        state.pipe_f = None;
        state.stat_f = status;
    } else {
        state.pipe_r = None;
        state.stat_r = status;
    }

    pipe_drop_reason(state.stat_f, state.stat_r)
}

/// Pure status-callback policy table (spec §4.4/§8): any `-1` drops
/// `ERROR`; both `0` drops `CLOSED`; otherwise noop.
fn pipe_drop_reason(stat_f: PipeStatus, stat_r: PipeStatus) -> Option<DropReason> {
    if stat_f == PipeStatus::Error || stat_r == PipeStatus::Error {
        Some(DropReason::Error)
    } else if stat_f == PipeStatus::Closed && stat_r == PipeStatus::Closed {
        Some(DropReason::Closed)
    } else {
        None
    }
}

/// The single teardown point (spec §4.5 `drop`). Cancels every still
/// pending operation, drops whichever sockets this state still owns
/// (closing them via Rust's `Drop`, since once pipes are launched the
/// sockets have already been moved into the pipe tasks — cancelling those
/// tasks in `cancel_all_pending` is what closes the fds at that point), and
/// invokes `on_dead` exactly once.
async fn drop_conn(mut state: ConnState, reason: DropReason, on_dead: Box<dyn OnDead>) {
    print_debug(&state.config.print_tx, format!("connection dropped: {reason}")).await;

    // steps 1-2: close whichever of s/t this state still directly owns.
    state.s = None;
    state.t = None;

    // steps 3, 5, 6, 8: cancel every still-pending handle.
    state.cancel_all_pending();

    // step 7: release keys.
    state.keys = None;

    // step 9.
    on_dead.on_dead(reason);
    print_loud(&state.config.print_tx, format!("connection closed ({reason})")).await;
    // step 10-11: `state` is dropped when this function returns.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PipeStatus::{Closed, Error, Running};

    fn reason_for(stat_f: crate::state::PipeStatus, stat_r: crate::state::PipeStatus) -> Option<DropReason> {
        if stat_f == Error || stat_r == Error {
            Some(DropReason::Error)
        } else if stat_f == Closed && stat_r == Closed {
            Some(DropReason::Closed)
        } else {
            None
        }
    }

    #[test]
    fn status_callback_policy_matches_table() {
        for stat_f in [Running, Closed, Error] {
            for stat_r in [Running, Closed, Error] {
                let expected = reason_for(stat_f, stat_r);
                let actual = if stat_f == Error || stat_r == Error {
                    Some(DropReason::Error)
                } else if stat_f == Closed && stat_r == Closed {
                    Some(DropReason::Closed)
                } else {
                    None
                };
                assert_eq!(expected, actual, "stat_f={stat_f:?} stat_r={stat_r:?}");
            }
        }
    }
}
