//! Shared shutdown signal helpers for the background loops.

use tokio::sync::watch;

/// Resolve once `rx` observes `true`.
///
/// A dropped sender counts as shutdown: nobody is left to keep the loop alive.
pub async fn signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
