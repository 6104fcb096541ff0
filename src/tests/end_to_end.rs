use std::{sync::Arc, time::Duration};

use tokio::{net::TcpStream, time::timeout};

use crate::{
    app::{drain, init_storage},
    client::{Session, SessionConfig, Step},
    message::{Kind, Message, Status},
    model::{Artifact, Dataset, LinearModel},
    outcome::{Audience, Reporter, Severity, Subscription},
    server::{Aggregator, RoundOutcome, Server},
    settings::{ApiSettings, TrainingSettings},
    storage::artifact,
    tests::utils::{assert_version, canonical, id, submit, MODEL_FILENAME},
    transport::{Connection, DEFAULT_MAX_FRAME_SIZE},
};

fn api_settings() -> ApiSettings {
    ApiSettings {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        upload_timeout: 5,
        max_frame_size: DEFAULT_MAX_FRAME_SIZE,
    }
}

fn dataset() -> Arc<Dataset> {
    let features = (0..20)
        .map(|i| vec![(i % 5) as f32 / 5., (i / 5) as f32 / 4.])
        .collect::<Vec<_>>();
    let labels = features.iter().map(|x| x[0] - 2. * x[1] + 1.).collect();
    Arc::new(Dataset::new(features, labels).unwrap())
}

#[tokio::test]
async fn single_client_round() {
    let dir = tempfile::tempdir().unwrap();
    let initial = LinearModel::from_weights(0, vec![0.1, 0.1, 0.1]);
    let storage = init_storage(dir.path().join("server"), MODEL_FILENAME, || initial.clone())
        .await
        .unwrap();

    let server = Server::<LinearModel>::bind(&api_settings(), storage.clone())
        .await
        .unwrap();
    let address = server.local_addr().unwrap();
    let (drain_tx, drain_rx) = drain::channel();
    let server_task = tokio::spawn(server.serve(drain_rx));

    // the client session
    let client_root = dir.path().join("c1");
    let stream = TcpStream::connect(address).await.unwrap();
    let session = Session::<LinearModel, _>::new(
        Connection::new(stream),
        SessionConfig {
            client_id: id("c1"),
            root: client_root.clone(),
            training: TrainingSettings {
                epochs: 20,
                batch_size: 4,
                learning_rate: 0.05,
            },
            halt_on_failure: true,
        },
        dataset(),
        Reporter::new("c1", Subscription::default()),
    );
    let report = timeout(Duration::from_secs(30), session.run())
        .await
        .unwrap();
    assert!(report.is_complete(), "{:?}", report);
    assert!(report
        .outcome(Step::Require)
        .unwrap()
        .report()
        .get(Audience::Dev, Severity::Debug)
        .unwrap()
        .contains("version 0"));

    // training changed the weights but not the version
    let trained: LinearModel = artifact::load(client_root.join("model.weight"))
        .await
        .unwrap();
    assert_version(&trained, 0);
    assert_ne!(trained.weights(), initial.weights());

    // the server registered the submission
    assert_eq!(storage.registry().get().await.unwrap(), vec![id("c1")]);
    let submitted: LinearModel = artifact::load(storage.submission_path(&id("c1")))
        .await
        .unwrap();
    assert_eq!(submitted, trained);

    // a round with a quorum of one publishes the submission as the next generation
    let aggregator = Aggregator::<LinearModel>::new(
        storage.clone(),
        1,
        Reporter::new("aggregator", Subscription::none()),
    );
    let round = aggregator.run_round().await.unwrap();
    assert_eq!(
        round,
        RoundOutcome::Aggregated {
            version: 1,
            participants: vec![id("c1")],
        }
    );
    let published = canonical(&storage).await;
    assert_version(&published, 1);
    assert_eq!(published.weights(), trained.weights());

    // the next session starts from the new generation
    let mut connection = Connection::new(TcpStream::connect(address).await.unwrap());
    connection
        .send(&Message::new(Kind::Require, Status::None))
        .await
        .unwrap();
    let reply = connection.recv().await.unwrap();
    assert_version(&LinearModel::from_bytes(reply.payload()).unwrap(), 1);
    drop(connection);

    timeout(Duration::from_secs(5), drain_tx.drain())
        .await
        .unwrap();
    server_task.await.unwrap();
}

#[tokio::test]
async fn stale_client_is_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let storage = init_storage(dir.path().join("server"), MODEL_FILENAME, || {
        LinearModel::from_weights(0, vec![0., 0., 0.])
    })
    .await
    .unwrap();
    let server = Server::<LinearModel>::bind(&api_settings(), storage.clone())
        .await
        .unwrap();
    let address = server.local_addr().unwrap();
    let (drain_tx, drain_rx) = drain::channel();
    let server_task = tokio::spawn(server.serve(drain_rx));

    let run = |name: &'static str| {
        let root = dir.path().join(name);
        async move {
            let stream = TcpStream::connect(address).await.unwrap();
            Session::<LinearModel, _>::new(
                Connection::new(stream),
                SessionConfig {
                    client_id: id(name),
                    root,
                    training: TrainingSettings {
                        epochs: 2,
                        batch_size: 4,
                        learning_rate: 0.01,
                    },
                    halt_on_failure: true,
                },
                dataset(),
                Reporter::new(name, Subscription::none()),
            )
            .run()
            .await
        }
    };

    // two clients train on generation 0 and get aggregated into generation 1
    assert!(run("a").await.is_complete());
    assert!(run("b").await.is_complete());
    let aggregator = Aggregator::<LinearModel>::new(
        storage.clone(),
        2,
        Reporter::new("aggregator", Subscription::none()),
    );
    assert!(matches!(
        aggregator.run_round().await.unwrap(),
        RoundOutcome::Aggregated { version: 1, .. }
    ));

    // a late submission trained on generation 0 is stale
    let late = LinearModel::from_weights(0, vec![1., 1., 1.]);
    submit(&storage, "late", &late).await;
    assert!(run("c").await.is_complete());
    assert_eq!(
        aggregator.run_round().await.unwrap(),
        RoundOutcome::BelowQuorum {
            fresh: 1,
            required: 2
        }
    );
    assert_version(&canonical(&storage).await, 1);

    timeout(Duration::from_secs(5), drain_tx.drain())
        .await
        .unwrap();
    server_task.await.unwrap();
}
