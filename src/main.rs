use anyhow::Result;
use genwatch::logging::init_logging;
use genwatch::{Application, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration problems are fatal before anything touches the relay
    let config = match Config::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("genwatch: invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Genwatch generator charge controller starting up");

    let app = Application::build(config)
        .map_err(|e| anyhow::anyhow!("Failed to build application: {}", e))?;

    match app.run().await {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Application failed with error: {}", e);
            Err(anyhow::anyhow!("Application error: {}", e))
        }
    }
}
