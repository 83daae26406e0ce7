use clap::Parser;
use log::{error, info};
use pagetrace::configuration::config::{Cli, Config};
use pagetrace::controller::controller_handler::Controller;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    let cli = Cli::parse();

    info!("Importing configuration");
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let controller = Controller::new(config);
    if let Err(e) = controller.run(cli.mode).await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
