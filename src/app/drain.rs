//! A drain channel to shut down long running tasks gracefully.
//!
//! Adapted from the linkerd2-proxy drain crate
//! (<https://github.com/linkerd/linkerd2-proxy/blob/f12988b773796b4fe46f5554bf5c2ad4b28f7f9b/linkerd/drain/src/lib.rs>)
//! for tokio 1.

use tokio::sync::{mpsc, watch};

/// Creates a drain channel.
///
/// The [`Signal`] starts a drain and the [`Watch`]es are notified once it started.
pub fn channel() -> (Signal, Watch) {
    let (signal_tx, signal_rx) = watch::channel(());
    let (drained_tx, drained_rx) = mpsc::channel(1);

    let signal = Signal {
        drained_rx,
        signal_tx,
    };
    let watch = Watch {
        drained_tx,
        signal_rx,
    };
    (signal, watch)
}

enum Never {}

/// Sends a drain command to all watchers.
#[derive(Debug)]
pub struct Signal {
    drained_rx: mpsc::Receiver<Never>,
    signal_tx: watch::Sender<()>,
}

/// Watches for a drain command.
///
/// All `Watch` instances must be dropped for [`Signal::drain`] to complete.
#[derive(Clone, Debug)]
pub struct Watch {
    drained_tx: mpsc::Sender<Never>,
    signal_rx: watch::Receiver<()>,
}

#[must_use = "ReleaseShutdown should be dropped explicitly to release the runtime"]
#[derive(Clone, Debug)]
pub struct ReleaseShutdown(mpsc::Sender<Never>);

impl Signal {
    /// Signals all watchers to begin draining and waits until all of them are dropped.
    pub async fn drain(mut self) {
        debug!("drain now");
        let _ = self.signal_tx.send(());
        match self.drained_rx.recv().await {
            None => debug!("drained"),
            Some(never) => match never {},
        }
    }
}

impl Watch {
    /// Returns a [`ReleaseShutdown`] handle once the drain has been signaled. The handle must be
    /// dropped when the shutdown of the watching task completed.
    pub async fn signaled(mut self) -> ReleaseShutdown {
        // an error means the signal is gone, which is as good as a drain
        let _ = self.signal_rx.changed().await;
        ReleaseShutdown(self.drained_tx)
    }
}
