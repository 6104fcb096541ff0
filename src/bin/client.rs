use std::{mem, path::PathBuf, process};

use structopt::StructOpt;
use tracing_subscriber::*;

use fedavg::{app, settings::ClientSettings};

#[derive(Debug, StructOpt)]
#[structopt(name = "Client")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    let mut settings = ClientSettings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(mem::take(&mut settings.log.filter))
        .with_ansi(true)
        .init();

    match app::run_client(settings).await {
        Ok(report) if report.is_complete() => {}
        Ok(_) => process::exit(2),
        Err(err) => {
            tracing::error!("{}", err);
            process::exit(1);
        }
    }
}
