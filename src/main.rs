use clap::Parser;
use factor_canon::{CliArgs, LoggingConfig, ServiceConfig, init_logging, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging(LoggingConfig::from_env())?;

    let cli = CliArgs::parse();
    let config = ServiceConfig::from_args(cli)?;
    config.validate()?;

    run_server(config).await
}
