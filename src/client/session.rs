use std::{marker::PhantomData, sync::Arc};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    client::{SessionConfig, SessionError, Step},
    message::{Kind, Message, Status, Upload},
    model::{Artifact, Dataset},
    outcome::{Audience, Outcome, Reporter, Severity},
    storage::artifact,
    transport::Connection,
};

#[derive(Debug, Clone)]
/// The outcomes of the steps a session went through.
pub struct SessionReport {
    pub outcomes: Vec<(Step, Outcome)>,
}

impl SessionReport {
    /// Checks whether every step ran and succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == Step::ALL.len()
            && self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    /// Gets the outcome of a step, if it ran.
    pub fn outcome(&self, step: Step) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }
}

/// A client session: `REQUIRE`, then `TRAIN`, then `SUBMIT`.
///
/// A session is not retried. With `halt_on_failure` the session stops after the first failed
/// step, otherwise every step runs regardless.
pub struct Session<A, S> {
    connection: Connection<S>,
    config: SessionConfig,
    dataset: Arc<Dataset>,
    reporter: Reporter,
    _artifact: PhantomData<A>,
}

impl<A, S> Session<A, S>
where
    A: Artifact,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        connection: Connection<S>,
        config: SessionConfig,
        dataset: Arc<Dataset>,
        reporter: Reporter,
    ) -> Self {
        Self {
            connection,
            config,
            dataset,
            reporter,
            _artifact: PhantomData,
        }
    }

    /// Runs the session and closes the connection.
    pub async fn run(mut self) -> SessionReport {
        let mut outcomes = Vec::with_capacity(Step::ALL.len());
        for step in Step::ALL.iter().copied() {
            info!("client {}: {}", self.config.client_id, step);
            let outcome = match step {
                Step::Require => self.require().await,
                Step::Train => self.train().await,
                Step::Submit => self.submit().await,
            };
            self.reporter.report(&outcome);
            let failed = !outcome.is_ok();
            outcomes.push((step, outcome));
            if failed && self.config.halt_on_failure {
                warn!("client {}: {} failed, ending session", self.config.client_id, step);
                break;
            }
        }
        if let Err(err) = self.connection.close().await {
            debug!("failed to close connection: {}", err);
        }
        SessionReport { outcomes }
    }

    /// Requires the global model and stores it as the local model.
    pub async fn require(&mut self) -> Outcome {
        self.try_require().await.unwrap_or_else(|err| {
            Outcome::failure(Audience::User, Severity::Error, "failed to require the model")
                .with(Audience::Dev, Severity::Error, err.to_string())
        })
    }

    async fn try_require(&mut self) -> Result<Outcome, SessionError> {
        self.connection
            .send(&Message::new(Kind::Require, Status::None))
            .await?;
        let reply = self.connection.recv().await?;
        let outcome = reply.check(Kind::Require, Status::Accept);
        if !outcome.is_ok() {
            return Ok(outcome);
        }
        let model = A::from_bytes(reply.payload())?;
        tokio::fs::create_dir_all(&self.config.root)
            .await
            .map_err(anyhow::Error::from)?;
        artifact::store(self.config.model_path(), &model).await?;
        Ok(Outcome::success().with(
            Audience::Dev,
            Severity::Debug,
            format!("received model version {}", model.version()),
        ))
    }

    /// Trains the local model on the local dataset.
    pub async fn train(&mut self) -> Outcome {
        self.try_train().await.unwrap_or_else(|err| {
            Outcome::failure(
                Audience::User,
                Severity::Notification,
                "failed to train the model",
            )
            .with(Audience::Dev, Severity::Error, err.to_string())
        })
    }

    async fn try_train(&mut self) -> Result<Outcome, SessionError> {
        let path = self.config.model_path();
        let mut model: A = artifact::load(&path).await?;
        let dataset = self.dataset.clone();
        let training = self.config.training;
        let (model, loss) = tokio::task::spawn_blocking(move || {
            let loss = model.train(&dataset, &training);
            (model, loss)
        })
        .await?;
        let loss = loss?;
        artifact::store(&path, &model).await?;
        Ok(Outcome::success().with(
            Audience::Dev,
            Severity::Debug,
            format!("final training loss {}", loss),
        ))
    }

    /// Submits the local model.
    pub async fn submit(&mut self) -> Outcome {
        self.try_submit().await.unwrap_or_else(|err| {
            Outcome::failure(Audience::User, Severity::Error, "failed to submit the model")
                .with(Audience::Dev, Severity::Error, err.to_string())
        })
    }

    async fn try_submit(&mut self) -> Result<Outcome, SessionError> {
        self.connection
            .send(&Message::new(Kind::Submit, Status::None))
            .await?;
        let reply = self.connection.recv().await?;
        let outcome = reply.check(Kind::Submit, Status::Accept);
        if !outcome.is_ok() {
            return Ok(outcome);
        }

        let model: A = artifact::load(self.config.model_path()).await?;
        let upload = Upload::new(self.config.client_id.clone(), model.to_bytes()?);
        self.connection.send(&upload.into_message()?).await?;
        let reply = self.connection.recv().await?;
        let outcome = reply.check(Kind::Submit, Status::Success);
        if outcome.is_ok() {
            Ok(Outcome::success().with(
                Audience::User,
                Severity::Notification,
                format!("submitted model version {}", model.version()),
            ))
        } else {
            Ok(outcome)
        }
    }
}
