use std::env;
use std::process::ExitCode;
use std::str::FromStr;

use micro_icap_gateway::config::AppConfig;
use micro_icap_gateway::{Server, ServiceRegistry};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

const CONFIG_ENV: &str = "ICAP_GATEWAY_CONFIG";
const LOG_LEVEL_ENV: &str = "ICAP_LOG_LEVEL";

// usage: icap-gateway [config.json]
#[tokio::main]
async fn main() -> ExitCode {
    let level = env::var(LOG_LEVEL_ENV).ok().and_then(|level| Level::from_str(&level).ok()).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    let Some(path) = env::args().nth(1).or_else(|| env::var(CONFIG_ENV).ok()) else {
        error!("no config file given, pass it as the first argument or set {CONFIG_ENV}");
        return ExitCode::FAILURE;
    };

    let config = match AppConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %path, cause = %e, "load config error");
            return ExitCode::FAILURE;
        }
    };

    let registry = match ServiceRegistry::from_config(&config) {
        Ok(registry) => registry,
        Err(e) => {
            error!(path = %path, cause = %e, "build services error");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::builder().address(config.address.as_str()).registry(registry).build() {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "build server error");
            return ExitCode::FAILURE;
        }
    };

    info!(address = server.address(), "starting icap gateway");
    match server.start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(cause = %e, "server error");
            ExitCode::FAILURE
        }
    }
}
