use log::{error, info};
use std::process::ExitCode;
use tokio::{select, signal};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let token = CancellationToken::new();
    let run = moniker::monitor_usernames(token.clone());

    select! {
        result = run => match result {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        },
        _ = signal::ctrl_c() => {
            token.cancel();
            info!("Interrupted, exiting");
            ExitCode::SUCCESS
        }
    }
}
