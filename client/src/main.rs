use {
    anyhow::Result,
    clap::Parser,
    reseal::{cli::Cli, config::Config, run, run_offline, setup_logger},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if run_offline(&cli.command)? {
        return Ok(());
    }
    let config = Config::load(&cli.config_path()?)?;
    setup_logger(&config.log_filter)?;
    run(&cli, config).await
}
