use std::{mem, path::PathBuf, process};

use structopt::StructOpt;
use tracing_subscriber::*;

use fedavg::{app, settings::Settings};

#[derive(Debug, StructOpt)]
#[structopt(name = "Server")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let mut settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(mem::take(&mut settings.log.filter))
        .with_ansi(true)
        .init();

    if let Err(err) = app::run_server(settings).await {
        tracing::error!("{}", err);
        process::exit(1);
    }
}
