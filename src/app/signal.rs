//! Shutdown signals.
//!
//! Adapted from the linkerd2-proxy signal crate
//! (<https://github.com/linkerd/linkerd2-proxy/blob/f12988b773796b4fe46f5554bf5c2ad4b28f7f9b/linkerd/signal/src/lib.rs>).

/// Returns a `Future` that completes when the process should start to shut down.
pub async fn shutdown() {
    imp::shutdown().await
}

#[cfg(unix)]
mod imp {
    use tokio::signal::unix::{signal, SignalKind};

    pub(super) async fn shutdown() {
        tokio::select! {
            // SIGINT, to allow Ctrl-C while developing
            () = sig(SignalKind::interrupt(), "SIGINT") => {}
            () = sig(SignalKind::terminate(), "SIGTERM") => {}
        };
    }

    async fn sig(kind: SignalKind, name: &'static str) {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
                info!(
                    // use target to remove 'imp' from output
                    target: "fedavg::signal",
                    "received {}, starting shutdown",
                    name,
                );
            }
            Err(err) => {
                error!("failed to register {} handler: {}", name, err);
                futures::future::pending::<()>().await
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub(super) async fn shutdown() {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!(
                // use target to remove 'imp' from output
                target: "fedavg::signal",
                "received Ctrl-C, starting shutdown",
            ),
            Err(err) => {
                error!("failed to register Ctrl-C handler: {}", err);
                futures::future::pending::<()>().await
            }
        }
    }
}
