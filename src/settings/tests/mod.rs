use std::{env, io::Write};

use serial_test::serial;

use super::*;
use crate::outcome::{Audience, Severity};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const MINIMAL_SERVER: &str = r#"
[api]
bind_address = "127.0.0.1:0"

[storage]
root = "/tmp/fedavg"

[model]
input_dim = 3

[log]
filter = "info"
"#;

const MINIMAL_CLIENT: &str = r#"
[client]
id = "c1"
server_address = "127.0.0.1:8081"
root = "/tmp/fedavg-client"
dataset = "/tmp/dataset.json"

[log]
filter = "info"
"#;

#[test]
#[serial]
fn test_settings_new() {
    let settings = Settings::new("configs/server.toml").unwrap();
    assert_eq!(settings.aggregation.quorum, 2);
    assert_eq!(settings.aggregation.period(), Duration::from_secs(180));
    assert_eq!(settings.model.input_dim, 2);
    assert!(settings.report.contains(Audience::Dev, Severity::Error));
    assert!(Settings::new("").is_err());
}

#[test]
#[serial]
fn test_client_settings_new() {
    let settings = ClientSettings::new("configs/client.toml").unwrap();
    assert_eq!(settings.client.id.as_str(), "client-1");
    assert!(settings.session.halt_on_failure);
    assert!(ClientSettings::new("").is_err());
}

#[test]
#[serial]
fn test_server_defaults() {
    let file = write_config(MINIMAL_SERVER);
    let settings = Settings::new(file.path()).unwrap();
    assert_eq!(settings.api.upload_timeout(), Duration::from_secs(60));
    assert_eq!(settings.api.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    assert_eq!(settings.aggregation.period, 180);
    assert_eq!(settings.aggregation.quorum, 2);
    assert_eq!(
        settings.storage.model_path(),
        PathBuf::from("/tmp/fedavg/global.weight")
    );
    assert_eq!(settings.report, Subscription::default());
}

#[test]
#[serial]
fn test_client_defaults() {
    let file = write_config(MINIMAL_CLIENT);
    let settings = ClientSettings::new(file.path()).unwrap();
    assert_eq!(settings.training, TrainingSettings::default());
    assert!(settings.session.halt_on_failure);
    assert_eq!(settings.client.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
}

#[test]
#[serial]
fn test_invalid_client_id() {
    let config = MINIMAL_CLIENT.replace("id = \"c1\"", "id = \"../c1\"");
    let file = write_config(&config);
    assert!(matches!(
        ClientSettings::new(file.path()),
        Err(SettingsError::Loading(_))
    ));
}

#[test]
#[serial]
fn test_invalid_quorum() {
    let config = format!("{}\n[aggregation]\nquorum = 0\n", MINIMAL_SERVER);
    let file = write_config(&config);
    assert!(matches!(
        Settings::new(file.path()),
        Err(SettingsError::Validation(_))
    ));
}

#[test]
#[serial]
fn test_invalid_frame_size() {
    let config = MINIMAL_SERVER.replace(
        "bind_address = \"127.0.0.1:0\"",
        "bind_address = \"127.0.0.1:0\"\nmax_frame_size = 5",
    );
    let file = write_config(&config);
    assert!(matches!(
        Settings::new(file.path()),
        Err(SettingsError::Validation(_))
    ));
}

#[test]
fn test_validate_training() {
    assert!(TrainingSettings::default().validate().is_ok());
    assert!(TrainingSettings {
        epochs: 0,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
    assert!(TrainingSettings {
        batch_size: 0,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
    assert!(TrainingSettings {
        learning_rate: 0.,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
    assert!(TrainingSettings {
        learning_rate: f32::NAN,
        ..TrainingSettings::default()
    }
    .validate()
    .is_err());
}

#[test]
#[serial]
fn test_invalid_log_filter() {
    let config = MINIMAL_SERVER.replace("filter = \"info\"", "filter = \"fedavg=loud\"");
    let file = write_config(&config);
    assert!(Settings::new(file.path()).is_err());
}

#[test]
#[serial]
fn test_environment_overrides() {
    let file = write_config(MINIMAL_SERVER);
    env::set_var("FEDAVG_AGGREGATION__QUORUM", "5");
    env::set_var("FEDAVG_API__UPLOAD_TIMEOUT", "7");
    let settings = Settings::new(file.path());
    env::remove_var("FEDAVG_AGGREGATION__QUORUM");
    env::remove_var("FEDAVG_API__UPLOAD_TIMEOUT");

    let settings = settings.unwrap();
    assert_eq!(settings.aggregation.quorum, 5);
    assert_eq!(settings.api.upload_timeout(), Duration::from_secs(7));
}
