//! The periodic aggregation of client submissions into the next generation of the canonical
//! model.

use std::{marker::PhantomData, time::Duration};

use thiserror::Error;
use tokio::time::{interval_at, Instant};

use crate::{
    app::drain,
    message::ClientId,
    model::{Artifact, ModelError},
    outcome::{Audience, Outcome, Reporter, Severity},
    storage::{artifact, ServerStorage, StorageError},
};

#[derive(Debug, Error)]
/// Errors of an aggregation round.
pub enum AggregationError {
    #[error("storage failure: {0:#}")]
    Storage(#[from] StorageError),
    #[error("averaging failed: {0}")]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Eq, PartialEq)]
/// The result of an aggregation round.
pub enum RoundOutcome {
    /// A new canonical model was published.
    Aggregated {
        version: u64,
        participants: Vec<ClientId>,
    },
    /// Not enough fresh submissions; nothing changed.
    BelowQuorum { fresh: usize, required: usize },
}

impl From<&RoundOutcome> for Outcome {
    fn from(round: &RoundOutcome) -> Self {
        match round {
            RoundOutcome::Aggregated {
                version,
                participants,
            } => Outcome::success().with(
                Audience::User,
                Severity::Notification,
                format!(
                    "published model version {} averaged over {} submissions",
                    version,
                    participants.len()
                ),
            ),
            RoundOutcome::BelowQuorum { fresh, required } => Outcome::failure(
                Audience::User,
                Severity::Notification,
                "aggregation skipped: not enough client models",
            )
            .with(
                Audience::Dev,
                Severity::Warning,
                format!("{} fresh submissions but {} required", fresh, required),
            ),
        }
    }
}

/// Aggregates the fresh client submissions.
pub struct Aggregator<A> {
    storage: ServerStorage,
    quorum: usize,
    reporter: Reporter,
    _artifact: PhantomData<A>,
}

impl<A> Aggregator<A>
where
    A: Artifact,
{
    pub fn new(storage: ServerStorage, quorum: usize, reporter: Reporter) -> Self {
        Self {
            storage,
            quorum,
            reporter,
            _artifact: PhantomData,
        }
    }

    /// Runs a single aggregation round.
    ///
    /// Only submissions of the same generation and shape as the canonical model take part. If
    /// fewer than `quorum` of them remain, the round is a no-op. Otherwise their uniform average
    /// becomes the next generation of the canonical model and the registry is cleared.
    pub async fn run_round(&self) -> Result<RoundOutcome, AggregationError> {
        let registered = self.storage.registry().get().await?;
        let mut canonical: A = artifact::load(self.storage.model_path()).await?;
        let version = canonical.version();

        let mut participants = Vec::with_capacity(registered.len());
        let mut models = Vec::with_capacity(registered.len());
        for client_id in registered {
            let submission: A = match artifact::load(self.storage.submission_path(&client_id)).await
            {
                Ok(submission) => submission,
                Err(err) => {
                    warn!("skipping submission of client {}: {:#}", client_id, err);
                    continue;
                }
            };
            if submission.version() != version {
                debug!(
                    "skipping stale submission of client {}: version {} instead of {}",
                    client_id,
                    submission.version(),
                    version
                );
                continue;
            }
            if let Err(err) = canonical.check_compatible(&submission) {
                warn!("skipping submission of client {}: {}", client_id, err);
                continue;
            }
            participants.push(client_id);
            models.push(submission);
        }

        if models.len() < self.quorum {
            return Ok(RoundOutcome::BelowQuorum {
                fresh: models.len(),
                required: self.quorum,
            });
        }

        canonical.average(&models, None)?;
        canonical.advance_version();
        artifact::store(self.storage.model_path(), &canonical).await?;
        self.storage.registry().clear().await?;
        Ok(RoundOutcome::Aggregated {
            version: canonical.version(),
            participants,
        })
    }

    /// Runs a round every `period` until a drain is signaled. The first round starts after one
    /// period.
    pub async fn run(self, period: Duration, shutdown: drain::Watch) {
        let mut interval = interval_at(Instant::now() + period, period);
        let signaled = shutdown.signaled();
        tokio::pin!(signaled);

        let release = loop {
            tokio::select! {
                release = &mut signaled => break release,
                _ = interval.tick() => self.tick().await,
            }
        };
        debug!("aggregation stopped");
        drop(release);
    }

    async fn tick(&self) {
        match self.run_round().await {
            Ok(round) => self.reporter.report(&Outcome::from(&round)),
            Err(err) => error!("aggregation failed: {}", err),
        }
    }
}
