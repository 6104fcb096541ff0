//! The server side of the protocol.
//!
//! The [`Server`] accepts connections and spawns a [`Responder`] for each of them. The
//! [`Aggregator`] runs next to it on a timer. Both share the [`ServerStorage`], whose registry
//! lock orders their updates.
//!
//! [`ServerStorage`]: crate::storage::ServerStorage

pub mod aggregator;
pub mod responder;

use std::{io, marker::PhantomData, net::SocketAddr, time::Duration};

use tokio::net::TcpListener;

pub use self::{
    aggregator::{AggregationError, Aggregator, RoundOutcome},
    responder::{Responder, SubmitError},
};
use crate::{
    app::drain,
    model::Artifact,
    settings::ApiSettings,
    storage::ServerStorage,
    transport::Connection,
};

/// How long to wait after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts client connections.
pub struct Server<A> {
    listener: TcpListener,
    storage: ServerStorage,
    upload_timeout: Duration,
    max_frame_size: usize,
    _artifact: PhantomData<A>,
}

impl<A> Server<A>
where
    A: Artifact,
{
    /// Binds the server to the configured address.
    pub async fn bind(settings: &ApiSettings, storage: ServerStorage) -> io::Result<Self> {
        let listener = TcpListener::bind(settings.bind_address).await?;
        Ok(Self {
            listener,
            storage,
            upload_timeout: settings.upload_timeout(),
            max_frame_size: settings.max_frame_size,
            _artifact: PhantomData,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until a drain is signaled. Running responders are not awaited.
    pub async fn serve(self, shutdown: drain::Watch) {
        let signaled = shutdown.signaled();
        tokio::pin!(signaled);

        let release = loop {
            tokio::select! {
                release = &mut signaled => break release,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        let connection = Connection::with_max_frame_size(stream, self.max_frame_size);
                        let responder = Responder::<A, _>::new(
                            connection,
                            self.storage.clone(),
                            self.upload_timeout,
                        );
                        tokio::spawn(responder.run());
                    }
                    Err(err) => back_off(err).await,
                },
            }
        };
        info!("stopped accepting connections");
        drop(release);
    }
}

/// Logs an `accept` failure and pauses the acceptor for [`ACCEPT_BACKOFF`].
async fn back_off(err: io::Error) {
    warn!(
        "failed to accept connection: {}; retrying in {:?}",
        err, ACCEPT_BACKOFF
    );
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}
