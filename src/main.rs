use crate::config::AppConfig;
use crate::error::AppError;
use clap::Parser;
use log::{error, info};
use xnsnet_server::server_init;

mod config;
mod error;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Optional TOML configuration file.
    #[clap(short, long, value_name = "CONFIG_FILE")]
    config: Option<String>,
    /// Optional `.env` file path for loading environment variables.
    #[clap(short, long, value_name = "ENV_FILE")]
    env_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Some(env_file) = &cli.env_file {
        dotenvy::from_filename(env_file)?;
    }

    let app_config = AppConfig::parse_config(cli.config.as_deref())?;
    env_logger::Builder::new()
        .parse_filters(&app_config.log_filter())
        .parse_default_env()
        .init();

    info!(
        "Starting machine {} on network {:X}",
        app_config.server.machine.host, app_config.server.machine.network
    );
    let server = tokio::spawn(server_init(app_config.server));
    if let Err(e) = server.await? {
        error!("{e}");
        return Err(e.into());
    }
    info!("Hub link closed; exiting");
    Ok(())
}
