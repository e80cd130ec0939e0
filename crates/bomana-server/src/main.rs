use std::process::ExitCode;

use bomana_server::{ServiceSettings, init_logging, serve};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match ServiceSettings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("bomana-server: {error}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(
        settings.log_level,
        settings.log_file.as_deref(),
        settings.max_log_size,
    );

    match serve(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            ExitCode::FAILURE
        }
    }
}
