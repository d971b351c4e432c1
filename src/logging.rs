//! Terminal printout channel. Grounded on the teacher's
//! `Printout`/`PrintSender` pattern rather than a generic logging facade:
//! a verbosity-tagged line of text sent over an unbounded mpsc channel to
//! whatever is driving the terminal.

use tokio::sync::mpsc;

/// A single line of output bound for the terminal, tagged with the
/// verbosity level at which it should be shown.
///
/// Verbosity levels, matching the teacher's convention:
/// - 0: always shown (errors, connection lifecycle).
/// - 1: shown with `-v`.
/// - 2: shown with `-vv` (per-connection debug detail).
#[derive(Debug, Clone)]
pub struct Printout {
    pub verbosity: u8,
    pub content: String,
}

pub type PrintSender = mpsc::UnboundedSender<Printout>;
pub type PrintReceiver = mpsc::UnboundedReceiver<Printout>;

pub fn channel() -> (PrintSender, PrintReceiver) {
    mpsc::unbounded_channel()
}

pub async fn print_loud(tx: &PrintSender, content: impl Into<String>) {
    let _ = tx.send(Printout {
        verbosity: 0,
        content: content.into(),
    });
}

pub async fn print_debug(tx: &PrintSender, content: impl Into<String>) {
    let _ = tx.send(Printout {
        verbosity: 2,
        content: content.into(),
    });
}

/// Drains the print channel to stderr, honoring the configured verbosity
/// ceiling. Meant to be spawned once for the process lifetime.
pub async fn run_printer(mut rx: PrintReceiver, max_verbosity: u8) {
    while let Some(p) = rx.recv().await {
        if p.verbosity <= max_verbosity {
            eprintln!("{}", p.content);
        }
    }
}
