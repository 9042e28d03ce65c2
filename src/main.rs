use tracing::info;

use selfserve::{Config, HttpVerificationGateway};

fn main() {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = selfserve::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        selfserve::logging::init_console_only(&config.logging.level);
    }

    info!("selfserve - banking self-service verification flows");

    match HttpVerificationGateway::new(&config.gateway) {
        Ok(_) => info!("verification gateway configured at {}", config.gateway.base_url),
        Err(e) => {
            eprintln!("Invalid gateway configuration: {e}");
            std::process::exit(1);
        }
    }
}
